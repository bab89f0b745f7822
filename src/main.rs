//! Basalt CLI - compile a source file to C

use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.as_slice() {
        [_, cmd, input, output] if cmd == "compile" => {
            compile_file(input, output);
        }
        _ => {
            eprintln!("usage: basalt compile <input> <output.c>");
            process::exit(2);
        }
    }
}

fn compile_file(input: &str, output: &str) {
    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {}", input, e);
            process::exit(1);
        }
    };

    let c_unit = match basalt::compile(&source) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(output, c_unit) {
        eprintln!("error writing {}: {}", output, e);
        process::exit(1);
    }
}
