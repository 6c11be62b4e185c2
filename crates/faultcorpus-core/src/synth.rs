//! Program synthesizer: renders a minimal C program per fault kind.
//!
//! Output is a pure function of `(kind, variant)`. Fault sites go through
//! `volatile` objects and `noinline` helpers so that the undefined behavior
//! survives default compilation instead of being folded away.

use tracing::debug;

use crate::domain::error::{FaultError, Result};
use crate::domain::kind::{Access, FaultClass, FaultKind, Variant};
use crate::domain::program::ProgramSpec;

/// Largest heap allocation a variant may request.
pub const MAX_ALLOC_SIZE: i64 = 1 << 20;
/// Largest stack array a variant may request.
pub const MAX_BUFFER_SIZE: i64 = 4096;
/// Largest overflow distance a variant may request.
pub const MAX_OVERFLOW_BY: i64 = 4096;
/// Deepest call chain a variant may request.
pub const MAX_CALL_DEPTH: u32 = 32;
/// Most leaked blocks a variant may request.
pub const MAX_LEAK_COUNT: u32 = 64;

const FILLER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const LITERAL_CHUNK: usize = 64;

/// Stateless program synthesizer.
pub struct Synthesizer;

impl Synthesizer {
    /// Synthesize the program for `kind` with its registered default variant.
    pub fn synthesize_default(kind: &FaultKind) -> Result<ProgramSpec> {
        Self::synthesize(kind, &kind.variant)
    }

    /// Synthesize the program for `kind` under `variant`.
    ///
    /// Fails with [`FaultError::UnsupportedVariant`] when a parameter the
    /// kind's class uses is out of range.
    pub fn synthesize(kind: &FaultKind, variant: &Variant) -> Result<ProgramSpec> {
        Self::validate(kind, variant)?;

        let mut src = CSource::default();
        render_header(&mut src, kind, variant);
        render_globals(&mut src, kind.class, variant);
        render_helpers(&mut src, kind.class, variant);
        render_fault_site(&mut src, kind.class, variant);
        render_call_chain(&mut src, variant.call_depth);
        render_main(&mut src, kind, variant.call_depth);

        let spec = ProgramSpec::new(kind.id.clone(), kind.class, variant.clone(), src.finish());
        debug!(kind = %kind.id, digest = %spec.short_digest(), "synthesized program");
        Ok(spec)
    }

    /// Check the parameters the kind's class reads.
    pub fn validate(kind: &FaultKind, variant: &Variant) -> Result<()> {
        let unsupported = |reason: String| FaultError::UnsupportedVariant {
            kind: kind.id.clone(),
            reason,
        };

        if variant.call_depth > MAX_CALL_DEPTH {
            return Err(unsupported(format!(
                "call_depth must be at most {MAX_CALL_DEPTH}, got {}",
                variant.call_depth
            )));
        }

        let check_range = |field: &str, value: i64, max: i64| {
            if (1..=max).contains(&value) {
                Ok(())
            } else {
                Err(unsupported(format!("{field} must be in 1..={max}, got {value}")))
            }
        };

        match kind.class {
            FaultClass::NullDeref => Ok(()),
            FaultClass::DoubleFree => check_range("alloc_size", variant.alloc_size, MAX_ALLOC_SIZE),
            FaultClass::Leak => {
                check_range("alloc_size", variant.alloc_size, MAX_ALLOC_SIZE)?;
                check_range(
                    "leak_count",
                    i64::from(variant.leak_count),
                    i64::from(MAX_LEAK_COUNT),
                )
            }
            FaultClass::StackBufferOverflow => {
                check_range("buffer_size", variant.buffer_size, MAX_BUFFER_SIZE)?;
                check_range("overflow_by", variant.overflow_by, MAX_OVERFLOW_BY)
            }
            FaultClass::StackUseAfterScope => {
                check_range("buffer_size", variant.buffer_size, MAX_BUFFER_SIZE)
            }
        }
    }
}

/// Line-oriented C source builder.
#[derive(Default)]
struct CSource {
    out: String,
}

impl CSource {
    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

fn render_header(src: &mut CSource, kind: &FaultKind, variant: &Variant) {
    src.line(0, "/* fault-corpus program");
    src.line(0, &format!(" * kind:    {}", kind.id));
    src.line(0, &format!(" * class:   {}", kind.class));
    src.line(
        0,
        &format!(
            " * variant: alloc_size={} buffer_size={} overflow_by={} call_depth={} leak_count={} access={} spin_forever={}",
            variant.alloc_size,
            variant.buffer_size,
            variant.overflow_by,
            variant.call_depth,
            variant.leak_count,
            access_name(variant.access),
            variant.spin_forever,
        ),
    );
    src.line(0, " */");
    src.blank();
    src.line(0, "#include <stdio.h>");
    src.line(0, "#include <stdlib.h>");
    src.line(0, "#include <string.h>");
    src.blank();
}

fn render_globals(src: &mut CSource, class: FaultClass, variant: &Variant) {
    let mut any = false;
    if variant.spin_forever {
        src.line(0, "static volatile int keep_spinning = 1;");
        any = true;
    }
    match class {
        FaultClass::StackUseAfterScope => {
            src.line(0, "static int *volatile escaped;");
            any = true;
        }
        FaultClass::StackBufferOverflow => {
            // Source length including the terminator exceeds the destination.
            let len = (variant.buffer_size + variant.overflow_by - 1) as usize;
            let text: String = FILLER.iter().cycle().take(len).map(|&b| b as char).collect();
            src.line(0, "static const char overflow_source[] =");
            let chunks: Vec<&str> = text
                .as_bytes()
                .chunks(LITERAL_CHUNK)
                .map(|c| std::str::from_utf8(c).unwrap_or_default())
                .collect();
            if chunks.is_empty() {
                src.line(1, "\"\";");
            }
            for (i, chunk) in chunks.iter().enumerate() {
                let end = if i + 1 == chunks.len() { ";" } else { "" };
                src.line(1, &format!("\"{chunk}\"{end}"));
            }
            any = true;
        }
        _ => {}
    }
    if any {
        src.blank();
    }
}

fn render_helpers(src: &mut CSource, class: FaultClass, variant: &Variant) {
    match class {
        FaultClass::DoubleFree => {
            src.line(0, "__attribute__((noinline)) static void *acquire(size_t amount)");
            src.line(0, "{");
            src.line(1, "return malloc(amount);");
            src.line(0, "}");
            src.blank();
            src.line(0, "__attribute__((noinline)) static void release(void *block)");
            src.line(0, "{");
            src.line(1, "free(block);");
            src.line(0, "}");
            src.blank();
        }
        FaultClass::StackBufferOverflow => {
            src.line(0, "__attribute__((noinline)) static void copy_into(const char *source)");
            src.line(0, "{");
            src.line(1, &format!("char destination[{}];", variant.buffer_size));
            src.line(1, "strcpy(destination, source);");
            src.line(1, "volatile char sink = destination[0];");
            src.line(1, "(void)sink;");
            src.line(0, "}");
            src.blank();
        }
        _ => {}
    }
}

fn render_fault_site(src: &mut CSource, class: FaultClass, variant: &Variant) {
    src.line(0, "__attribute__((noinline)) static void trigger_fault(void)");
    src.line(0, "{");
    if variant.spin_forever {
        src.line(1, "while (keep_spinning) {");
        src.line(1, "}");
    }
    match class {
        FaultClass::NullDeref => {
            src.line(1, "int *volatile target = NULL;");
            match variant.access {
                Access::Write => src.line(1, "*target = 16;"),
                Access::Read => {
                    src.line(1, "volatile int sink = *target;");
                    src.line(1, "(void)sink;");
                }
            }
        }
        FaultClass::DoubleFree => {
            src.line(
                1,
                &format!("unsigned char *first = acquire({});", variant.alloc_size),
            );
            src.line(1, "unsigned char *volatile second = first;");
            src.line(1, "if (first == NULL) {");
            src.line(2, "return;");
            src.line(1, "}");
            src.line(1, "first[0] = 1;");
            src.line(1, "release(first);");
            src.line(1, "free(second);");
        }
        FaultClass::Leak => {
            src.line(
                1,
                &format!("for (int i = 0; i < {}; i++) {{", variant.leak_count),
            );
            src.line(
                2,
                &format!("unsigned char *volatile block = malloc({});", variant.alloc_size),
            );
            src.line(2, "if (block != NULL) {");
            src.line(3, "block[0] = (unsigned char)i;");
            src.line(2, "}");
            src.line(2, "block = NULL;");
            src.line(1, "}");
        }
        FaultClass::StackBufferOverflow => {
            src.line(1, "copy_into(overflow_source);");
        }
        FaultClass::StackUseAfterScope => {
            let size = variant.buffer_size;
            src.line(1, "{");
            src.line(2, &format!("int scoped[{size}];"));
            src.line(2, &format!("for (int i = 0; i < {size}; i++) {{"));
            src.line(3, "scoped[i] = i;");
            src.line(2, "}");
            src.line(2, &format!("escaped = &scoped[{}];", size / 2));
            src.line(1, "}");
            src.line(1, "volatile int value = 20 + *escaped;");
            src.line(1, "(void)value;");
        }
    }
    src.line(0, "}");
    src.blank();
}

fn render_call_chain(src: &mut CSource, depth: u32) {
    for level in 1..=depth {
        let callee = frame_name(level - 1);
        src.line(
            0,
            &format!("__attribute__((noinline)) static void {}(void)", frame_name(level)),
        );
        src.line(0, "{");
        src.line(1, &format!("{callee}();"));
        src.line(0, "}");
        src.blank();
    }
}

fn render_main(src: &mut CSource, kind: &FaultKind, depth: u32) {
    src.line(0, "int main(void)");
    src.line(0, "{");
    src.line(1, &format!("printf(\"fault-corpus: %s\\n\", \"{}\");", kind.id));
    src.line(1, "fflush(stdout);");
    src.line(1, &format!("{}();", frame_name(depth)));
    src.line(1, "return 0;");
    src.line(0, "}");
}

fn frame_name(level: u32) -> String {
    if level == 0 {
        "trigger_fault".to_string()
    } else {
        format!("call_depth_{level}")
    }
}

fn access_name(access: Access) -> &'static str {
    match access {
        Access::Read => "read",
        Access::Write => "write",
    }
}
