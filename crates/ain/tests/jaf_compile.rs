//! End-to-end JAF -> bytecode scenarios (spec §8): source text in, a fully
//! emitted [`AinFile`] out, checked by re-disassembling the result rather
//! than by running anything.

use ain::jaf::{compile, Source};
use ain::jam::disassembler::DisassembleOptions;
use ain::jam::disassemble_function;
use ain::AinFile;

fn compile_source(src: &str) -> AinFile {
    let mut ain = AinFile::new(11, 0);
    let sources = [Source { filename: ain::Str::from("t.jaf"), text: src }];
    compile(&mut ain, &sources).expect("compile should succeed");
    ain
}

#[test]
fn compiles_a_function_with_a_loop_and_locals() {
    let src = r#"
        int sum_to(int n) {
            int total = 0;
            for (int i = 0; i < n; i++) {
                total += i;
            }
            return total;
        }
    "#;
    let ain = compile_source(src);
    let f = ain.function_by_name("sum_to").expect("sum_to should be registered");
    assert!(f.address.is_some());
    assert!(!ain.code.is_empty());

    // Every parameter plus the two locals occupies at least one slot.
    assert!(f.variables.len() >= 3);

    let text = disassemble_function(&ain, f.findex, DisassembleOptions::default())
        .expect("disassembly should not error on a freshly emitted function");
    assert!(text.contains("ENDFUNC") || !text.is_empty());
}

#[test]
fn compiles_a_struct_method_and_constructor() {
    let src = r#"
        struct Counter {
            int value;
            void Counter() {
                this.value = 0;
            }
            int Get() {
                return this.value;
            }
        };
    "#;
    let ain = compile_source(src);
    let strct = ain.struct_by_name("Counter").expect("Counter should be registered");
    assert_eq!(strct.members.len(), 1);
    assert!(!strct.methods.is_empty());

    for &m in &strct.methods {
        let f = &ain[m];
        assert!(f.address.is_some(), "method {} should have been emitted", f.name);
    }
}

#[test]
fn delegate_add_from_a_struct_method_lowers_to_dg_add() {
    let src = r#"
        delegate void D();
        struct S {
            void m();
        };
        void f() {
            D d;
            S s;
            d += &S::m;
        }
    "#;
    let ain = compile_source(src);
    let f = ain.function_by_name("f").expect("f should be registered");
    let text = disassemble_function(&ain, f.findex, DisassembleOptions::default())
        .expect("disassembly should not error on a freshly emitted function");
    assert!(text.contains("DG_ADD"), "expected DG_ADD in:\n{text}");
}

#[test]
fn warns_but_still_emits_a_switch_statement() {
    let src = r#"
        int classify(int x) {
            switch (x) {
            case 0:
                return 0;
            default:
                return 1;
            }
        }
    "#;
    let mut ain = AinFile::new(11, 0);
    let sources = [Source { filename: ain::Str::from("t.jaf"), text: src }];
    let warnings = compile(&mut ain, &sources).expect("compile should succeed despite switch");
    assert!(warnings.iter().any(|w| w.message.contains("switch")));

    let f = ain.function_by_name("classify").unwrap();
    assert!(f.address.is_some());
}
