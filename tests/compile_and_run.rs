//! End-to-end tests: compile a C source string with `c11cc`, assemble
//! and link it with the system `cc`, run the resulting binary, and
//! assert on its exit code/stdout.
//!
//! These need a real `cc` (and a Linux x86-64 host) on `$PATH`, so
//! they're `#[ignore]`d by default — run with `cargo test -- --ignored`
//! on a host with a toolchain installed.

use c11cc::config::CompilerConfig;
use std::process::Command;
use tempfile::tempdir;

fn compile_and_run(source: &str) -> (i32, String) {
    let dir = tempdir().expect("tempdir");
    let src_path = dir.path().join("input.c");
    let bin_path = dir.path().join("a.out");
    std::fs::write(&src_path, source).expect("write source");

    let config = CompilerConfig::new();
    c11cc::driver::compile_file(&src_path, &bin_path, &config).expect("compile_file");

    let output = Command::new(&bin_path).output().expect("run binary");
    let code = output.status.code().expect("exit code");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    (code, stdout)
}

#[test]
#[ignore]
fn arithmetic_expression_evaluates_with_correct_precedence() {
    let (code, _) = compile_and_run(
        r#"
        int main(void) {
            int a = 2;
            int b = 3;
            int c = 4;
            return a + b * c - 1;
        }
        "#,
    );
    assert_eq!(code, 13);
}

#[test]
#[ignore]
fn array_sum_loop_accumulates_correctly() {
    let (code, _) = compile_and_run(
        r#"
        int main(void) {
            int xs[5];
            int i;
            int total;
            for (i = 0; i < 5; i = i + 1) {
                xs[i] = i * 2;
            }
            total = 0;
            for (i = 0; i < 5; i = i + 1) {
                total = total + xs[i];
            }
            return total;
        }
        "#,
    );
    assert_eq!(code, 20);
}

#[test]
#[ignore]
fn sizeof_battery_matches_expected_layout() {
    let (code, _) = compile_and_run(
        r#"
        struct pair {
            int a;
            long b;
        };
        int main(void) {
            int total = 0;
            total = total + (int)sizeof(int);
            total = total + (int)sizeof(long);
            total = total + (int)sizeof(char *);
            total = total + (int)sizeof(struct pair);
            return total;
        }
        "#,
    );
    assert_eq!(code, 4 + 8 + 8 + 16);
}

#[test]
#[ignore]
fn trie_load_and_check_reports_membership() {
    let (code, _) = compile_and_run(
        r#"
        struct node {
            struct node *children[2];
            int is_word;
        };

        struct node nodes[16];
        int next_node;

        struct node *make_node(void) {
            struct node *n = &nodes[next_node];
            next_node = next_node + 1;
            n->children[0] = 0;
            n->children[1] = 0;
            n->is_word = 0;
            return n;
        }

        void insert(struct node *root, int bits, int depth) {
            struct node *cur = root;
            int i;
            for (i = depth - 1; i >= 0; i = i - 1) {
                int bit = (bits >> i) & 1;
                if (cur->children[bit] == 0) {
                    cur->children[bit] = make_node();
                }
                cur = cur->children[bit];
            }
            cur->is_word = 1;
        }

        int contains(struct node *root, int bits, int depth) {
            struct node *cur = root;
            int i;
            for (i = depth - 1; i >= 0; i = i - 1) {
                int bit = (bits >> i) & 1;
                cur = cur->children[bit];
                if (cur == 0) {
                    return 0;
                }
            }
            return cur->is_word;
        }

        int main(void) {
            struct node *root;
            next_node = 0;
            root = make_node();
            insert(root, 5, 3);
            insert(root, 2, 3);
            if (!contains(root, 5, 3)) return 1;
            if (!contains(root, 2, 3)) return 2;
            if (contains(root, 3, 3)) return 3;
            return 0;
        }
        "#,
    );
    assert_eq!(code, 0);
}

#[test]
#[ignore]
fn function_pointer_through_isalpha_classifies_characters() {
    let (code, _) = compile_and_run(
        r#"
        #include <ctype.h>
        int main(void) {
            int (*f)(int) = isalpha;
            if (f(5) != 0) return 1;
            if (f(65) == 0) return 2;
            return 0;
        }
        "#,
    );
    assert_eq!(code, 0);
}

#[test]
#[ignore]
fn static_local_counter_persists_across_calls() {
    let (code, _) = compile_and_run(
        r#"
        int next_id(void) {
            static int counter = 0;
            counter = counter + 1;
            return counter;
        }
        int main(void) {
            int a = next_id();
            int b = next_id();
            int c = next_id();
            return a + b + c;
        }
        "#,
    );
    assert_eq!(code, 6);
}
