//! Content sniffing for files whose extension does not identify a language

/// Interpreter named by a `#!` line, without path or version suffix
///
/// `#!/usr/bin/env python3` and `#!/usr/bin/python3` both yield `python3`.
pub(crate) fn shebang_interpreter(source: &[u8]) -> Option<String> {
    let rest = source.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    let line = String::from_utf8_lossy(&rest[..line_end]);
    let mut parts = line.split_whitespace();
    let program = parts.next()?;
    let program = program.rsplit('/').next().unwrap_or(program);
    let interpreter = if program == "env" {
        // Skip env flags such as `-S`
        parts.find(|p| !p.starts_with('-'))?
    } else {
        program
    };
    Some(interpreter.to_string())
}

/// Whether `interpreter` matches one of the descriptor's prefixes
pub(crate) fn interpreter_matches(interpreter: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| interpreter.starts_with(p))
}

/// Number of distinct markers that occur in the first few kilobytes
pub(crate) fn marker_score(source: &[u8], markers: &[&str]) -> usize {
    const SNIFF_WINDOW: usize = 8 * 1024;
    let window = &source[..source.len().min(SNIFF_WINDOW)];
    let text = String::from_utf8_lossy(window);
    markers.iter().filter(|m| text.contains(*m)).count()
}
