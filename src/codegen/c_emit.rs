//! C code generation
//!
//! Emits one C translation unit from a Cmm program. The fixed runtime
//! source is included first; every Cmm function becomes a C function
//! returning `void *` (the next code label), with one static info table
//! per closure shape and a static closure per top-level global.
//!
//! Function prologs follow a fixed order: push the update frame if the
//! closure is updateable, run the argument-satisfaction check, reserve
//! heap, then pop arguments and load captured fields into locals. The
//! reservation happens while every live pointer is still on a stack, so
//! a collection there cannot lose anything.

use std::fmt::Write;

use crate::ast::Builtin;
use crate::codegen::cmm::{
    ArgInfo, BuiltinArg, CmmProgram, CodeBlock, Function, FunctionBody, FunctionName, Instruction,
    IntValue, Location, StringValue, WORD,
};
use crate::codegen::stg::ValueKind;

/// The runtime library the emitted unit is prefixed with
pub const RUNTIME_SOURCE: &str = include_str!("../../runtime/runtime.c");

/// Emit a complete C translation unit
pub fn emit_c(program: &CmmProgram) -> String {
    let mut emitter = CEmitter::new();
    emitter.emit_program(program);
    emitter.finish()
}

/// Pre-order numbering of the function tree
struct FnInfo {
    /// Child function ids, indexed by sub-function position
    children: Vec<usize>,
    /// Display path for comments
    path: String,
}

struct CEmitter {
    infos: Vec<FnInfo>,
    forward_decls: String,
    tables: String,
    literals: String,
    functions: String,
    literal_count: usize,
}

impl CEmitter {
    fn new() -> Self {
        CEmitter {
            infos: Vec::new(),
            forward_decls: String::new(),
            tables: String::new(),
            literals: String::new(),
            functions: String::new(),
            literal_count: 0,
        }
    }

    fn finish(self) -> String {
        let mut out = String::new();
        out.push_str(RUNTIME_SOURCE);
        out.push_str("\n/* ---- generated code ---- */\n\n");
        out.push_str(&self.forward_decls);
        out.push('\n');
        out.push_str(&self.literals);
        out.push('\n');
        out.push_str(&self.tables);
        out.push('\n');
        out.push_str(&self.functions);
        out
    }

    fn emit_program(&mut self, program: &CmmProgram) {
        // Entry is function 0; top-level bindings follow
        let mut next = 0;
        let entry_id = self.number(&program.entry, &mut next, "entry");
        let mut top_ids = Vec::with_capacity(program.functions.len());
        for f in &program.functions {
            let path = match &f.name {
                FunctionName::Named(n) => n.clone(),
                _ => String::from("?"),
            };
            top_ids.push(self.number(f, &mut next, &path));
        }

        for id in 0..next {
            let _ = writeln!(self.forward_decls, "static void *fn_{}(void);", id);
        }

        // Static closures for the globals, entry included
        self.emit_global_closure(&program.entry, entry_id);
        for (f, id) in program.functions.iter().zip(&top_ids) {
            self.emit_global_closure(f, *id);
        }

        self.emit_function(&program.entry, entry_id);
        for (f, id) in program.functions.iter().zip(&top_ids) {
            self.emit_function(f, *id);
        }

        self.emit_main(entry_id);
    }

    fn number(&mut self, f: &Function, next: &mut usize, path: &str) -> usize {
        let id = *next;
        *next += 1;
        self.infos.push(FnInfo {
            children: Vec::new(),
            path: path.to_string(),
        });
        let mut children = Vec::with_capacity(f.sub_functions.len());
        for (i, sub) in f.sub_functions.iter().enumerate() {
            let child_path = match &sub.name {
                FunctionName::Named(n) => format!("{}.{}", path, n),
                FunctionName::CaseAlts => format!("{}.alts{}", path, i),
                FunctionName::Entry => String::from("entry"),
            };
            children.push(self.number(sub, next, &child_path));
        }
        self.infos[id].children = children;
        id
    }

    fn emit_global_closure(&mut self, f: &Function, id: usize) {
        let index = f.global_index.expect("top-level functions carry an index");
        let _ = writeln!(
            self.tables,
            "static InfoTable table_for_fn_{} = {{&fn_{}, &static_evac}};",
            id, id
        );
        let _ = writeln!(
            self.tables,
            "static InfoTable *global_{}[1] = {{&table_for_fn_{}}};",
            index, id
        );
    }

    /// Info table and evacuation code for a heap-allocated closure shape
    fn emit_closure_table(&mut self, f: &Function, id: usize) {
        let ptrs = f.bound.ptrs;
        let ints = f.bound.ints;
        let strings = f.bound.strings;
        let padded = f.updateable && f.bound.total() == 0;
        let size = WORD * (1 + (ptrs + ints + strings) as u64 + padded as u64);

        let mut evac = String::new();
        let _ = writeln!(evac, "static uint8_t *evac_{}(uint8_t *base) {{", id);
        let _ = writeln!(evac, "  uint8_t *new_base = heap_cursor();");
        let _ = writeln!(evac, "  heap_write(base, {});", size);
        let _ = writeln!(evac, "  InfoTable *forwarded = &table_for_already_evac;");
        let _ = writeln!(evac, "  memcpy(base, &forwarded, sizeof(InfoTable *));");
        let _ = writeln!(evac, "  memcpy(base + sizeof(InfoTable *), &new_base, sizeof(uint8_t *));");
        for i in 0..ptrs {
            let _ = writeln!(evac, "  evac_field(new_base + {});", WORD * (1 + i as u64));
        }
        for i in 0..strings {
            let off = WORD * (1 + (ptrs + ints + i) as u64);
            let _ = writeln!(evac, "  evac_field(new_base + {});", off);
        }
        let _ = writeln!(evac, "  return new_base;");
        let _ = writeln!(evac, "}}");
        self.tables.push_str(&evac);
        let _ = writeln!(
            self.tables,
            "static InfoTable table_for_fn_{} = {{&fn_{}, &evac_{}}};",
            id, id, id
        );
    }

    fn register_literal(&mut self, s: &str) -> String {
        let id = self.literal_count;
        self.literal_count += 1;
        let bytes = s.len() + 1;
        let _ = writeln!(
            self.literals,
            "static struct {{ InfoTable *table; char data[{}]; }} string_{} = \
             {{&table_for_string_literal, {}}};",
            bytes,
            id,
            c_string(s)
        );
        format!("(uint8_t *)&string_{}", id)
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn emit_function(&mut self, f: &Function, id: usize) {
        // Only closures that get allocated need tables; globals already
        // have static ones
        if f.global_index.is_none() && f.name != FunctionName::CaseAlts {
            self.emit_closure_table(f, id);
        }
        for (sub, child) in f.sub_functions.iter().zip(self.infos[id].children.clone()) {
            self.emit_function(sub, child);
        }

        let mut body = String::new();
        let _ = writeln!(body, "/* {} */", self.infos[id].path);
        let _ = writeln!(body, "static void *fn_{}(void) {{", id);

        if f.updateable {
            let update_code = match f.ret {
                ValueKind::Int => "update_int",
                ValueKind::Str => "update_string",
                ValueKind::Pointer => "update_constructor",
            };
            let _ = writeln!(body, "  g_SB.top[0].as_closure = g_NodeRegister;");
            let _ = writeln!(body, "  ++g_SB.top;");
            let _ = writeln!(body, "  save_SA();");
            let _ = writeln!(body, "  save_SB();");
            let _ = writeln!(body, "  g_SB.top[0].as_code = &{};", update_code);
            let _ = writeln!(body, "  ++g_SB.top;");
        }

        if f.arg_count > 0 {
            let _ = writeln!(
                body,
                "  CodeLabel update = check_application_update({}, &fn_{});",
                f.arg_count, id
            );
            let _ = writeln!(body, "  if (update != NULL) {{ return update; }}");
        }

        match &f.body {
            FunctionBody::Normal(block) => {
                self.emit_block(&mut body, f, id, block, None, 1);
            }
            FunctionBody::IntCase { branches, default, buried } => {
                let _ = writeln!(body, "  switch (g_IntRegister) {{");
                for (lit, block) in branches {
                    let _ = writeln!(body, "  case {}: {{", lit);
                    self.emit_block(&mut body, f, id, block, Some((0, *buried)), 2);
                    let _ = writeln!(body, "  }}");
                }
                let _ = writeln!(body, "  default: {{");
                self.emit_block(&mut body, f, id, default, Some((0, *buried)), 2);
                let _ = writeln!(body, "  }}");
                let _ = writeln!(body, "  }}");
            }
            FunctionBody::TagCase { branches, default, buried } => {
                let _ = writeln!(body, "  switch (g_TagRegister) {{");
                for (tag, fields, block) in branches {
                    let _ = writeln!(body, "  case {}: {{", tag);
                    self.emit_block(&mut body, f, id, block, Some((*fields, *buried)), 2);
                    let _ = writeln!(body, "  }}");
                }
                let _ = writeln!(body, "  default: {{");
                self.emit_block(&mut body, f, id, default, Some((0, *buried)), 2);
                let _ = writeln!(body, "  }}");
                let _ = writeln!(body, "  }}");
            }
            FunctionBody::StringCase { branches, default, buried } => {
                let _ = writeln!(
                    body,
                    "  const char *scrut = (const char *)(g_StringRegister + sizeof(InfoTable *));"
                );
                for (lit, block) in branches {
                    let _ = writeln!(body, "  if (strcmp(scrut, {}) == 0) {{", c_string(lit));
                    self.emit_block(&mut body, f, id, block, Some((0, *buried)), 2);
                    let _ = writeln!(body, "  }}");
                }
                let _ = writeln!(body, "  {{");
                self.emit_block(&mut body, f, id, default, Some((0, *buried)), 2);
                let _ = writeln!(body, "  }}");
            }
        }

        let _ = writeln!(body, "}}");
        let _ = writeln!(body);
        self.functions.push_str(&body);
    }

    /// Emit one code block: reservation, stack pops, field loads, then
    /// the instructions
    fn emit_block(
        &mut self,
        out: &mut String,
        f: &Function,
        id: usize,
        block: &CodeBlock,
        case_entry: Option<(u32, ArgInfo)>,
        indent: usize,
    ) {
        let pad = "  ".repeat(indent);
        let bytes = block.allocation.bytes();
        if bytes > 0 {
            let _ = writeln!(out, "{}heap_reserve({});", pad, bytes);
        }

        match case_entry {
            Some((fields, buried)) => {
                // Constructor fields arrive on top of the A-stack
                for i in 0..fields {
                    let _ = writeln!(
                        out,
                        "{}uint8_t *arg_{} = g_SA.top[-{}];",
                        pad,
                        i,
                        i + 1
                    );
                }
                if fields > 0 {
                    let _ = writeln!(out, "{}g_SA.top -= {};", pad, fields);
                }
                // Buried pointers sit under buried strings
                let s = buried.strings;
                let p = buried.ptrs;
                for i in 0..s {
                    let _ = writeln!(
                        out,
                        "{}uint8_t *buried_str_{} = g_SA.top[-{}];",
                        pad,
                        i,
                        s - i
                    );
                }
                for i in 0..p {
                    let _ = writeln!(
                        out,
                        "{}uint8_t *buried_{} = g_SA.top[-{}];",
                        pad,
                        i,
                        s + p - i
                    );
                }
                if p + s > 0 {
                    let _ = writeln!(out, "{}g_SA.top -= {};", pad, p + s);
                }
                for i in 0..buried.ints {
                    let _ = writeln!(
                        out,
                        "{}int64_t buried_int_{} = g_SB.top[-{}].as_int;",
                        pad,
                        i,
                        buried.ints - i
                    );
                }
                if buried.ints > 0 {
                    let _ = writeln!(out, "{}g_SB.top -= {};", pad, buried.ints);
                }
            }
            None => {
                // Ordinary entry: pop arguments, load captured fields
                for i in 0..f.arg_count {
                    let _ = writeln!(
                        out,
                        "{}uint8_t *arg_{} = g_SA.top[-{}];",
                        pad,
                        i,
                        i + 1
                    );
                }
                if f.arg_count > 0 {
                    let _ = writeln!(out, "{}g_SA.top -= {};", pad, f.arg_count);
                }
                for i in 0..f.bound.ptrs {
                    let off = WORD * (1 + i as u64);
                    let _ = writeln!(
                        out,
                        "{}uint8_t *ptr_{} = read_ptr(g_NodeRegister + {});",
                        pad, i, off
                    );
                }
                for i in 0..f.bound.ints {
                    let off = WORD * (1 + (f.bound.ptrs + i) as u64);
                    let _ = writeln!(
                        out,
                        "{}int64_t int_{} = read_int(g_NodeRegister + {});",
                        pad, i, off
                    );
                }
                for i in 0..f.bound.strings {
                    let off = WORD * (1 + (f.bound.ptrs + f.bound.ints + i) as u64);
                    let _ = writeln!(
                        out,
                        "{}uint8_t *str_{} = read_ptr(g_NodeRegister + {});",
                        pad, i, off
                    );
                }
            }
        }

        // Allocation addresses are static offsets from the reservation
        let offsets = allocation_offsets(f, block);
        if !offsets.is_empty() {
            let _ = writeln!(out, "{}uint8_t *alloc_base = heap_cursor();", pad);
            for (i, off) in offsets.iter().enumerate() {
                let _ = writeln!(out, "{}uint8_t *alloc_{} = alloc_base + {};", pad, i, off);
            }
        }

        for instr in &block.instructions {
            self.emit_instruction(out, f, id, instr, &pad);
        }
    }

    fn emit_instruction(
        &mut self,
        out: &mut String,
        f: &Function,
        id: usize,
        instr: &Instruction,
        pad: &str,
    ) {
        match instr {
            Instruction::StoreInt(v) => {
                let _ = writeln!(out, "{}g_IntRegister = {};", pad, self.int_value(v));
            }
            Instruction::StoreString(v) => {
                let _ = writeln!(out, "{}g_StringRegister = {};", pad, self.string_value(v));
            }
            Instruction::StoreTag(tag) => {
                let _ = writeln!(out, "{}g_TagRegister = {};", pad, tag);
            }
            Instruction::StoreConstructorArgCount(n) => {
                let _ = writeln!(out, "{}g_ConstructorArgCountRegister = {};", pad, n);
            }
            Instruction::Enter(loc) => {
                let _ = writeln!(out, "{}g_NodeRegister = {};", pad, location(loc));
                let _ = writeln!(
                    out,
                    "{}return read_info_table(g_NodeRegister)->entry;",
                    pad
                );
            }
            Instruction::EnterCaseContinuation => {
                let _ = writeln!(out, "{}--g_SB.top;", pad);
                let _ = writeln!(out, "{}return g_SB.top[0].as_code;", pad);
            }
            Instruction::PrintError(msg) => {
                let _ = writeln!(out, "{}fputs({}, stderr);", pad, c_string(msg));
                let _ = writeln!(out, "{}fputc('\\n', stderr);", pad);
            }
            Instruction::Exit => {
                let _ = writeln!(out, "{}exit(1);", pad);
                let _ = writeln!(out, "{}return NULL;", pad);
            }
            Instruction::Builtin1(op, a) => self.emit_builtin1(out, *op, a, pad),
            Instruction::Builtin2(op, a, b) => self.emit_builtin2(out, *op, a, b, pad),
            Instruction::SAPush(loc) | Instruction::Bury(loc) => {
                let _ = writeln!(out, "{}g_SA.top[0] = {};", pad, location(loc));
                let _ = writeln!(out, "{}++g_SA.top;", pad);
            }
            Instruction::BuryString(v) => {
                let _ = writeln!(out, "{}g_SA.top[0] = {};", pad, self.string_value(v));
                let _ = writeln!(out, "{}++g_SA.top;", pad);
            }
            Instruction::BuryInt(v) => {
                let _ = writeln!(out, "{}g_SB.top[0].as_int = {};", pad, self.int_value(v));
                let _ = writeln!(out, "{}++g_SB.top;", pad);
            }
            Instruction::PushCaseContinuation(sub) => {
                let child = self.infos[id].children[*sub as usize];
                let _ = writeln!(out, "{}g_SB.top[0].as_code = &fn_{};", pad, child);
                let _ = writeln!(out, "{}++g_SB.top;", pad);
            }
            Instruction::AllocTable { sub, pointers, ints, strings } => {
                let child = self.infos[id].children[*sub as usize];
                let target = &f.sub_functions[*sub as usize];
                let _ = writeln!(
                    out,
                    "{}heap_write_info_table(&table_for_fn_{});",
                    pad, child
                );
                for loc in pointers {
                    let _ = writeln!(out, "{}heap_write_ptr({});", pad, location(loc));
                }
                for v in ints {
                    let _ = writeln!(out, "{}heap_write_int({});", pad, self.int_value(v));
                }
                for v in strings {
                    let _ = writeln!(out, "{}heap_write_ptr({});", pad, self.string_value(v));
                }
                if target.updateable && target.bound.total() == 0 {
                    // Reserved word the update will write into
                    let _ = writeln!(out, "{}heap_write_ptr(NULL);", pad);
                }
            }
            Instruction::AllocInt(v) => {
                let _ = writeln!(
                    out,
                    "{}heap_write_info_table(table_pointer_for_int_value);",
                    pad
                );
                let _ = writeln!(out, "{}heap_write_int({});", pad, self.int_value(v));
            }
            Instruction::AllocString(s) => {
                let padded = crate::codegen::cmm::literal_string_bytes(s);
                let _ = writeln!(
                    out,
                    "{}heap_write_info_table(table_pointer_for_string);",
                    pad
                );
                let _ = writeln!(
                    out,
                    "{}heap_write({}, {});",
                    pad,
                    c_string_padded(s, padded as usize),
                    padded
                );
            }
        }
    }

    fn emit_builtin1(&mut self, out: &mut String, op: Builtin, a: &BuiltinArg, pad: &str) {
        match (op, a) {
            (Builtin::PrintInt, BuiltinArg::Int(v)) => {
                let _ = writeln!(
                    out,
                    "{}printf(\"%\" PRId64 \"\\n\", {});",
                    pad,
                    self.int_value(v)
                );
                let _ = writeln!(out, "{}g_TagRegister = 0;", pad);
                let _ = writeln!(out, "{}g_ConstructorArgCountRegister = 0;", pad);
            }
            (Builtin::PrintString, BuiltinArg::Str(v)) => {
                let _ = writeln!(
                    out,
                    "{}fputs((const char *)({} + sizeof(InfoTable *)), stdout);",
                    pad,
                    self.string_value(v)
                );
                let _ = writeln!(out, "{}fputc('\\n', stdout);", pad);
                let _ = writeln!(out, "{}g_TagRegister = 0;", pad);
                let _ = writeln!(out, "{}g_ConstructorArgCountRegister = 0;", pad);
            }
            (Builtin::Negate, BuiltinArg::Int(v)) => {
                let _ = writeln!(out, "{}g_IntRegister = -({});", pad, self.int_value(v));
            }
            _ => unreachable!("ill-kinded unary builtin"),
        }
    }

    fn emit_builtin2(
        &mut self,
        out: &mut String,
        op: Builtin,
        a: &BuiltinArg,
        b: &BuiltinArg,
        pad: &str,
    ) {
        if op == Builtin::Concat {
            let (BuiltinArg::Str(a), BuiltinArg::Str(b)) = (a, b) else {
                unreachable!("concat takes strings");
            };
            let _ = writeln!(
                out,
                "{}g_StringRegister = string_concat({}, {});",
                pad,
                self.string_value(a),
                self.string_value(b)
            );
            return;
        }

        let (BuiltinArg::Int(a), BuiltinArg::Int(b)) = (a, b) else {
            unreachable!("arithmetic takes ints");
        };
        let a = self.int_value(a);
        let b = self.int_value(b);
        match op {
            Builtin::Add => {
                let _ = writeln!(out, "{}g_IntRegister = {} + {};", pad, a, b);
            }
            Builtin::Sub => {
                let _ = writeln!(out, "{}g_IntRegister = {} - {};", pad, a, b);
            }
            Builtin::Mul => {
                let _ = writeln!(out, "{}g_IntRegister = {} * {};", pad, a, b);
            }
            Builtin::Div => {
                let _ = writeln!(out, "{}g_IntRegister = int_div({}, {});", pad, a, b);
            }
            Builtin::Less
            | Builtin::LessEqual
            | Builtin::Greater
            | Builtin::GreaterEqual
            | Builtin::EqualTo
            | Builtin::NotEqualTo => {
                let c_op = match op {
                    Builtin::Less => "<",
                    Builtin::LessEqual => "<=",
                    Builtin::Greater => ">",
                    Builtin::GreaterEqual => ">=",
                    Builtin::EqualTo => "==",
                    _ => "!=",
                };
                let _ = writeln!(
                    out,
                    "{}g_TagRegister = ({} {} {}) ? 1 : 0;",
                    pad, a, c_op, b
                );
                let _ = writeln!(out, "{}g_ConstructorArgCountRegister = 0;", pad);
            }
            _ => unreachable!("ill-kinded binary builtin"),
        }
    }

    fn int_value(&mut self, v: &IntValue) -> String {
        match v {
            IntValue::Literal(n) => format!("INT64_C({})", n),
            IntValue::At(loc) => location(loc),
        }
    }

    fn string_value(&mut self, v: &StringValue) -> String {
        match v {
            StringValue::Literal(s) => self.register_literal(s),
            StringValue::At(loc) => location(loc),
        }
    }

    fn emit_main(&mut self, entry_id: usize) {
        let mut main = String::new();
        let _ = writeln!(main, "static void *halt(void) {{");
        let _ = writeln!(main, "  return NULL;");
        let _ = writeln!(main, "}}");
        let _ = writeln!(main);
        let _ = writeln!(main, "int main(void) {{");
        let _ = writeln!(main, "  setup();");
        let _ = writeln!(main, "  g_SB.top[0].as_code = &halt;");
        let _ = writeln!(main, "  ++g_SB.top;");
        let _ = writeln!(main, "  CodeLabel label = &fn_{};", entry_id);
        let _ = writeln!(main, "  while (label != NULL) {{");
        let _ = writeln!(main, "    label = (CodeLabel)label();");
        let _ = writeln!(main, "  }}");
        let _ = writeln!(main, "  cleanup();");
        let _ = writeln!(main, "  return 0;");
        let _ = writeln!(main, "}}");
        self.functions.push_str(&main);
    }
}

/// Byte sizes of each allocation in a block, turned into running offsets
fn allocation_offsets(f: &Function, block: &CodeBlock) -> Vec<u64> {
    let mut offsets = Vec::new();
    let mut cursor = 0u64;
    for instr in &block.instructions {
        let size = match instr {
            Instruction::AllocTable { sub, pointers, ints, strings } => {
                let target = &f.sub_functions[*sub as usize];
                let pad = (target.updateable && target.bound.total() == 0) as u64;
                WORD * (1 + pointers.len() as u64 + ints.len() as u64 + strings.len() as u64 + pad)
            }
            Instruction::AllocInt(_) => 2 * WORD,
            Instruction::AllocString(s) => {
                WORD + crate::codegen::cmm::literal_string_bytes(s)
            }
            _ => continue,
        };
        offsets.push(cursor);
        cursor += size;
    }
    debug_assert_eq!(cursor, block.allocation.bytes());
    offsets
}

fn location(loc: &Location) -> String {
    match loc {
        Location::Arg(i) => format!("arg_{}", i),
        Location::Bound(i) => format!("ptr_{}", i),
        Location::BoundInt(i) => format!("int_{}", i),
        Location::BoundString(i) => format!("str_{}", i),
        Location::Global(i) => format!("(uint8_t *)global_{}", i),
        Location::Allocated(i) => format!("alloc_{}", i),
        Location::Buried(i) => format!("buried_{}", i),
        Location::BuriedInt(i) => format!("buried_int_{}", i),
        Location::BuriedString(i) => format!("buried_str_{}", i),
        Location::IntRegister => String::from("g_IntRegister"),
        Location::StringRegister => String::from("g_StringRegister"),
    }
}

/// Escape a Rust string as a C string literal
fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A C literal of exactly `len` bytes: the string, its NUL, and zero
/// padding
fn c_string_padded(s: &str, len: usize) -> String {
    let mut out = c_string(s);
    let pad = len - (s.len() + 1);
    if pad > 0 {
        // Embedded NULs extend the literal to the padded size
        out.pop();
        for _ in 0..pad {
            out.push_str("\\000");
        }
        out.push('"');
    }
    out
}

/// The reservation a block makes, exposed for tests
pub fn block_reservation(block: &CodeBlock) -> u64 {
    block.allocation.bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{lower_cmm, lower_stg};
    use crate::infer::infer;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::simplifier::{simplify, NameSource};
    use crate::types::TypeContext;

    fn emit_source(input: &str) -> String {
        let tokens = Lexer::new(input).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let ctx = TypeContext::from_program(&program).unwrap();
        let mut names = NameSource::new();
        let simplified = simplify(&program, &ctx, &mut names).unwrap();
        let typed = infer(&simplified, ctx).unwrap();
        let stg = lower_stg(&typed, &mut names).unwrap();
        let cmm = lower_cmm(&stg).unwrap();
        emit_c(&cmm)
    }

    #[test]
    fn test_unit_includes_runtime_and_main() {
        let c = emit_source("main = printInt 42");
        assert!(c.contains("void heap_reserve(size_t amount)"));
        assert!(c.contains("int main(void)"));
        assert!(c.contains("setup();"));
        assert!(c.contains("cleanup();"));
    }

    #[test]
    fn test_print_literal_emitted() {
        let c = emit_source("main = printInt 42");
        assert!(c.contains("printf(\"%\" PRId64 \"\\n\", INT64_C(42));"));
    }

    #[test]
    fn test_every_function_declared() {
        let c = emit_source("f x = x + 1; main = printInt (f 2)");
        assert!(c.contains("static void *fn_0(void);"));
        // The entry enters main through its global closure
        assert!(c.contains("static InfoTable *global_0[1]"));
    }

    #[test]
    fn test_update_frame_pushed_for_thunks() {
        let c = emit_source("main = printInt (1 + 2 * 3)");
        assert!(c.contains("g_SB.top[0].as_code = &update_int;"));
        assert!(c.contains("save_SA();"));
        assert!(c.contains("save_SB();"));
    }

    #[test]
    fn test_argument_check_emitted() {
        let c = emit_source("f x = x; main = printInt 1");
        assert!(c.contains("check_application_update(1, "));
    }

    #[test]
    fn test_string_literal_closure() {
        let c = emit_source(r#"main = printString "hi""#);
        assert!(c.contains("&table_for_string_literal"));
        assert!(c.contains("\"hi\""));
    }

    #[test]
    fn test_c_string_escaping() {
        assert_eq!(c_string("a\"b\\c\nd"), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn test_c_string_padded() {
        assert_eq!(c_string_padded("ab", 8), "\"ab\\000\\000\\000\\000\\000\"");
        assert_eq!(c_string_padded("1234567", 8), "\"1234567\"");
    }

    #[test]
    fn test_heap_reserved_before_allocation() {
        let c = emit_source("main = printInt (1 + 2 * 3)");
        // The thunk body allocates: a reservation must appear
        assert!(c.contains("heap_reserve(16);"));
    }

    #[test]
    fn test_no_dollar_names_leak_into_c_identifiers() {
        let c = emit_source("f x = x + 1; main = printInt (f 2)");
        for line in c.lines() {
            if line.contains('$') {
                // Dollar signs may only appear inside comments
                assert!(line.trim_start().starts_with("/*"), "stray $ in: {}", line);
            }
        }
    }
}
