//! The fixed IR chunks the compiler itself emits: the target triple and C
//! runtime declarations, and the D-string bookkeeping runtime (spec §4.6,
//! §4.6.2). None of this is read from anywhere else; it's written here once
//! and appended verbatim into every compiled module.

/// Declares the C runtime functions the generated code calls directly
/// (spec §4.6: malloc, free, printf, sprintf, snprintf, strlen, strcpy,
/// strcat, strcmp).
pub fn preamble() -> String {
    let mut out = String::new();
    out.push_str("target triple = \"x86_64-unknown-linux-gnu\"\n\n");
    out.push_str("declare ptr @malloc(i64)\n");
    out.push_str("declare void @free(ptr)\n");
    out.push_str("declare i32 @printf(ptr, ...)\n");
    out.push_str("declare i32 @sprintf(ptr, ptr, ...)\n");
    out.push_str("declare i32 @snprintf(ptr, i64, ptr, ...)\n");
    out.push_str("declare i64 @strlen(ptr)\n");
    out.push_str("declare ptr @strcpy(ptr, ptr)\n");
    out.push_str("declare ptr @strcat(ptr, ptr)\n");
    out.push_str("declare i32 @strcmp(ptr, ptr)\n");
    out.push('\n');
    out
}

/// Shared constants for rendering a `boolean` value as text (spec §4.6:
/// "booleans expand to the literal words `true`/`false`"), used both by
/// `print`/`println` and by D-string placeholder formatters.
pub fn bool_string_globals() -> String {
    let mut out = String::new();
    out.push_str("@.str.bool.true = private unnamed_addr constant [5 x i8] c\"true\\00\"\n");
    out.push_str("@.str.bool.false = private unnamed_addr constant [6 x i8] c\"false\\00\"\n\n");
    out
}

/// The D-string runtime: a struct carrying a per-literal formatter function
/// pointer, a cached rendered result, the tracked variable-pointer array,
/// and a dirty flag, plus the five lifecycle functions named in spec §4.6.2.
///
/// `DString_get` only re-renders when dirty, by calling back through the
/// formatter the compiler generated for that literal (`@.dstr.fmt.<N>` in
/// `dstring.rs`) — that's where the actual per-placeholder `snprintf` logic
/// lives, since the argument list for each literal's template is fixed at
/// compile time and C varargs can't be driven generically from here.
pub fn dstring_runtime() -> String {
    let mut out = String::new();
    out.push_str("%struct.DString = type { ptr, ptr, ptr, i32, i1 }\n\n");

    out.push_str("define ptr @DString_create(ptr %formatter, ptr %vars, i32 %count) {\n");
    out.push_str("entry:\n");
    out.push_str("  %mem = call ptr @malloc(i64 32)\n");
    out.push_str("  %formatter_slot = getelementptr %struct.DString, ptr %mem, i32 0, i32 0\n");
    out.push_str("  store ptr %formatter, ptr %formatter_slot\n");
    out.push_str("  %cached_slot = getelementptr %struct.DString, ptr %mem, i32 0, i32 1\n");
    out.push_str("  store ptr null, ptr %cached_slot\n");
    out.push_str("  %vars_slot = getelementptr %struct.DString, ptr %mem, i32 0, i32 2\n");
    out.push_str("  store ptr %vars, ptr %vars_slot\n");
    out.push_str("  %count_slot = getelementptr %struct.DString, ptr %mem, i32 0, i32 3\n");
    out.push_str("  store i32 %count, ptr %count_slot\n");
    out.push_str("  %dirty_slot = getelementptr %struct.DString, ptr %mem, i32 0, i32 4\n");
    out.push_str("  store i1 true, ptr %dirty_slot\n");
    out.push_str("  ret ptr %mem\n");
    out.push_str("}\n\n");

    out.push_str("define ptr @DString_get(ptr %d) {\n");
    out.push_str("entry:\n");
    out.push_str("  %dirty_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 4\n");
    out.push_str("  %dirty = load i1, ptr %dirty_slot\n");
    out.push_str("  br i1 %dirty, label %refresh, label %cached\n");
    out.push_str("refresh:\n");
    out.push_str("  %cached_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 1\n");
    out.push_str("  %old = load ptr, ptr %cached_slot\n");
    out.push_str("  %old_is_null = icmp eq ptr %old, null\n");
    out.push_str("  br i1 %old_is_null, label %render, label %free_old\n");
    out.push_str("free_old:\n");
    out.push_str("  call void @free(ptr %old)\n");
    out.push_str("  br label %render\n");
    out.push_str("render:\n");
    out.push_str("  %formatter_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 0\n");
    out.push_str("  %formatter = load ptr, ptr %formatter_slot\n");
    out.push_str(
        "  %fresh = call ptr %formatter(ptr %d)\n",
    );
    out.push_str("  store ptr %fresh, ptr %cached_slot\n");
    out.push_str("  store i1 false, ptr %dirty_slot\n");
    out.push_str("  ret ptr %fresh\n");
    out.push_str("cached:\n");
    out.push_str("  %cached_slot2 = getelementptr %struct.DString, ptr %d, i32 0, i32 1\n");
    out.push_str("  %value = load ptr, ptr %cached_slot2\n");
    out.push_str("  ret ptr %value\n");
    out.push_str("}\n\n");

    out.push_str("define void @DString_setVar(ptr %d, i32 %index, ptr %new_value) {\n");
    out.push_str("entry:\n");
    out.push_str("  %vars_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 2\n");
    out.push_str("  %vars = load ptr, ptr %vars_slot\n");
    out.push_str("  %slot = getelementptr ptr, ptr %vars, i32 %index\n");
    out.push_str("  store ptr %new_value, ptr %slot\n");
    out.push_str("  call void @DString_markDirty(ptr %d)\n");
    out.push_str("  ret void\n");
    out.push_str("}\n\n");

    out.push_str("define void @DString_markDirty(ptr %d) {\n");
    out.push_str("entry:\n");
    out.push_str("  %dirty_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 4\n");
    out.push_str("  store i1 true, ptr %dirty_slot\n");
    out.push_str("  ret void\n");
    out.push_str("}\n\n");

    out.push_str("define void @DString_free(ptr %d) {\n");
    out.push_str("entry:\n");
    out.push_str("  %cached_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 1\n");
    out.push_str("  %cached = load ptr, ptr %cached_slot\n");
    out.push_str("  %cached_is_null = icmp eq ptr %cached, null\n");
    out.push_str("  br i1 %cached_is_null, label %free_vars, label %free_cached\n");
    out.push_str("free_cached:\n");
    out.push_str("  call void @free(ptr %cached)\n");
    out.push_str("  br label %free_vars\n");
    out.push_str("free_vars:\n");
    out.push_str("  %vars_slot = getelementptr %struct.DString, ptr %d, i32 0, i32 2\n");
    out.push_str("  %vars = load ptr, ptr %vars_slot\n");
    out.push_str("  call void @free(ptr %vars)\n");
    out.push_str("  call void @free(ptr %d)\n");
    out.push_str("  ret void\n");
    out.push_str("}\n\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_declares_the_c_runtime() {
        let text = preamble();
        for sym in ["malloc", "free", "printf", "sprintf", "snprintf", "strlen", "strcpy", "strcat", "strcmp"] {
            assert!(text.contains(sym), "missing {}", sym);
        }
    }

    #[test]
    fn dstring_runtime_defines_all_five_lifecycle_functions() {
        let text = dstring_runtime();
        for sym in ["DString_create", "DString_get", "DString_setVar", "DString_markDirty", "DString_free"] {
            assert!(text.contains(&format!("@{}", sym)), "missing {}", sym);
        }
    }
}
