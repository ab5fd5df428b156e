//! Rule-based inference of category and severity for events that arrive
//! without them.

use error_collector_protocol::{Category, Context, ErrorSource, Severity};

const COMPILERS: &[&str] = &["gcc", "g++", "clang", "javac", "tsc", "rustc"];
const PACKAGE_MANAGERS: &[&str] = &["npm", "pip", "cargo", "apt", "brew"];
const FILESYSTEM_COMMANDS: &[&str] = &["ls", "cd", "mkdir", "rm", "cp", "mv"];
const NETWORK_COMMANDS: &[&str] = &["curl", "wget", "ping", "ssh"];

const BROWSER_ERROR_TYPES: &[&str] = &[
    "TypeError",
    "ReferenceError",
    "SyntaxError",
    "RangeError",
    "URIError",
    "EvalError",
    "SecurityError",
    "NetworkError",
    "DOMException",
    "AbortError",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Category from message keywords alone.
pub fn category_from_message(message: &str) -> Category {
    let msg = message.to_lowercase();
    if contains_any(
        &msg,
        &["syntax error", "syntaxerror", "unexpected token", "parse error"],
    ) {
        Category::Syntax
    } else if contains_any(
        &msg,
        &["network", "fetch", "cors", "connection", "timeout", "404", "500"],
    ) {
        Category::Network
    } else if contains_any(
        &msg,
        &["permission", "access denied", "unauthorized", "forbidden"],
    ) {
        Category::Permission
    } else if contains_any(&msg, &["out of memory", "disk space", "resource", "quota"]) {
        Category::Resource
    } else if contains_any(&msg, &["runtime", "reference", "type", "null", "undefined"]) {
        Category::Runtime
    } else {
        Category::Unknown
    }
}

/// Category for a failed shell command, using the program name and exit code
/// before falling back to message keywords.
pub fn terminal_category(command: Option<&str>, exit_code: Option<i64>, message: &str) -> Category {
    let msg = message.to_lowercase();
    let program = command
        .and_then(|c| c.split_whitespace().next())
        .map(|p| p.rsplit('/').next().unwrap_or(p).to_lowercase());

    if let Some(program) = program.as_deref() {
        if COMPILERS.contains(&program) {
            return if contains_any(&msg, &["syntax error", "parse error"]) {
                Category::Syntax
            } else {
                Category::Runtime
            };
        }
        if PACKAGE_MANAGERS.contains(&program) {
            return if contains_any(&msg, &["permission", "access denied"]) {
                Category::Permission
            } else if contains_any(&msg, &["network", "connection", "timeout"]) {
                Category::Network
            } else {
                Category::Resource
            };
        }
        if program == "git" {
            return if contains_any(&msg, &["permission", "access denied"]) {
                Category::Permission
            } else if contains_any(&msg, &["network", "connection", "remote"]) {
                Category::Network
            } else {
                Category::Logic
            };
        }
        if FILESYSTEM_COMMANDS.contains(&program) {
            return if msg.contains("permission") {
                Category::Permission
            } else if msg.contains("no such file") {
                Category::Resource
            } else {
                Category::Logic
            };
        }
        if NETWORK_COMMANDS.contains(&program) {
            return Category::Network;
        }
    }

    match exit_code {
        Some(126) | Some(127) => Category::Permission,
        Some(130) => Category::Logic,
        Some(code) if code > 128 => Category::Runtime,
        _ => category_from_message(message),
    }
}

pub fn infer_category(source: ErrorSource, message: &str, context: &Context) -> Category {
    match source {
        ErrorSource::Terminal => terminal_category(
            context.get("command").and_then(|v| v.as_text()),
            context.get("exit_code").and_then(|v| v.as_int()),
            message,
        ),
        ErrorSource::Browser | ErrorSource::Unknown => category_from_message(message),
    }
}

pub fn infer_severity(message: &str, category: Category) -> Severity {
    let msg = message.to_lowercase();
    if contains_any(
        &msg,
        &["critical", "fatal", "crash", "segmentation fault", "out of memory"],
    ) {
        Severity::Critical
    } else if contains_any(&msg, &["error", "exception", "failed", "cannot", "unable"])
        || matches!(category, Category::Syntax | Category::Permission)
    {
        Severity::High
    } else if contains_any(&msg, &["warning", "deprecated", "notice"]) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Extracts a JavaScript error class from the message prefix (`TypeError: ...`).
pub fn browser_error_type(message: &str) -> Option<&'static str> {
    let head = message.trim_start();
    BROWSER_ERROR_TYPES
        .iter()
        .copied()
        .find(|ty| head.starts_with(ty) || head.starts_with(&format!("Uncaught {ty}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_collector_protocol::ContextValue;

    #[test]
    fn message_keywords_pick_category() {
        assert_eq!(category_from_message("Unexpected token '<'"), Category::Syntax);
        assert_eq!(category_from_message("Failed to fetch"), Category::Network);
        assert_eq!(category_from_message("403 Forbidden"), Category::Permission);
        assert_eq!(category_from_message("quota exceeded"), Category::Resource);
        assert_eq!(category_from_message("x is undefined"), Category::Runtime);
        assert_eq!(category_from_message("something odd"), Category::Unknown);
    }

    #[test]
    fn terminal_rules_use_program_then_exit_code() {
        assert_eq!(
            terminal_category(Some("/usr/bin/gcc main.c"), Some(1), "main.c:3: syntax error"),
            Category::Syntax
        );
        assert_eq!(
            terminal_category(Some("npm install"), Some(1), "EACCES: permission denied"),
            Category::Permission
        );
        assert_eq!(
            terminal_category(Some("git push"), Some(128), "rejected"),
            Category::Logic
        );
        assert_eq!(
            terminal_category(Some("rm foo"), Some(1), "No such file or directory"),
            Category::Resource
        );
        assert_eq!(terminal_category(Some("curl x"), Some(6), "boom"), Category::Network);
        assert_eq!(terminal_category(Some("foo"), Some(127), "not found"), Category::Permission);
        assert_eq!(terminal_category(None, Some(130), "interrupted"), Category::Logic);
        assert_eq!(terminal_category(None, Some(139), "core dumped"), Category::Runtime);
    }

    #[test]
    fn infer_category_reads_terminal_context() {
        let mut ctx = Context::new();
        ctx.insert("command".to_string(), ContextValue::from("cargo build"));
        ctx.insert("exit_code".to_string(), ContextValue::from(101));
        assert_eq!(
            infer_category(ErrorSource::Terminal, "could not compile", &ctx),
            Category::Resource
        );
    }

    #[test]
    fn severity_rules() {
        assert_eq!(infer_severity("Segmentation fault", Category::Runtime), Severity::Critical);
        assert_eq!(infer_severity("request failed", Category::Network), Severity::High);
        assert_eq!(infer_severity("bad indent", Category::Syntax), Severity::High);
        assert_eq!(infer_severity("API is deprecated", Category::Unknown), Severity::Low);
        assert_eq!(infer_severity("x is undefined", Category::Runtime), Severity::Medium);
    }

    #[test]
    fn extracts_browser_error_type() {
        assert_eq!(browser_error_type("TypeError: x is undefined"), Some("TypeError"));
        assert_eq!(
            browser_error_type("Uncaught ReferenceError: y"),
            Some("ReferenceError")
        );
        assert_eq!(browser_error_type("plain failure"), None);
    }
}
