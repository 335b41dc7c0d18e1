//! Pattern tables for script-family languages (TypeScript, JavaScript and
//! other brace languages) and Rust.

use super::{ExtractOptions, ExtractedSymbol, Extraction, SymbolExtractor};
use crate::text::truncate;
use crate::types::{Language, SymbolKind};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const MAX_SIGNATURE_CHARS: usize = 200;

/// Captured names that are really keywords (`export const enum`, `const fn`).
const RESERVED_NAMES: &[&str] = &["enum", "fn", "function", "class", "async", "mut", "_"];

struct DeclPattern {
    kind: SymbolKind,
    regex: Regex,
}

fn decl(kind: SymbolKind, pattern: &str) -> DeclPattern {
    DeclPattern {
        kind,
        regex: Regex::new(pattern).expect("declaration pattern is valid"),
    }
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("pattern is valid")
}

static SCRIPT_DECLS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    const ID: &str = r"([A-Za-z_$][\w$]*)";
    vec![
        decl(
            SymbolKind::Class,
            &format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+{ID}"),
        ),
        decl(
            SymbolKind::Interface,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+{ID}"),
        ),
        decl(
            SymbolKind::Function,
            &format!(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*{ID}"
            ),
        ),
        decl(
            SymbolKind::Const,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?const\s+{ID}"),
        ),
        decl(
            SymbolKind::Let,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?let\s+{ID}"),
        ),
        decl(
            SymbolKind::Var,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?var\s+{ID}"),
        ),
        decl(
            SymbolKind::TypeAlias,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+{ID}\s*(?:<[^=]*>)?\s*="),
        ),
        decl(
            SymbolKind::Enum,
            &format!(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+{ID}"),
        ),
    ]
});

static RUST_DECLS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    const VIS: &str = r"^\s*(?:pub(?:\s*\([^)]*\))?\s+)?";
    const ID: &str = r"([A-Za-z_]\w*)";
    vec![
        decl(
            SymbolKind::Function,
            &format!(
                r#"{VIS}(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+{ID}"#
            ),
        ),
        decl(SymbolKind::Struct, &format!(r"{VIS}struct\s+{ID}")),
        decl(SymbolKind::Enum, &format!(r"{VIS}enum\s+{ID}")),
        decl(
            SymbolKind::Trait,
            &format!(r"{VIS}(?:unsafe\s+)?(?:auto\s+)?trait\s+{ID}"),
        ),
        decl(SymbolKind::Const, &format!(r"{VIS}const\s+{ID}")),
        decl(SymbolKind::Static, &format!(r"{VIS}static\s+(?:mut\s+)?{ID}")),
        decl(SymbolKind::TypeAlias, &format!(r"{VIS}type\s+{ID}")),
        decl(SymbolKind::Module, &format!(r"{VIS}mod\s+{ID}")),
    ]
});

static SCRIPT_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"(?m)^[ \t]*import\s+(?:type\s+)?([^;'"]*?)\s*from\s*['"]"#));
static SCRIPT_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r#"(?m)^[ \t]*(?:const|let|var)\s+(\{[^}]*\}|[A-Za-z_$][\w$]*)\s*=\s*require\s*\("#)
});
static SCRIPT_EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^[ \t]*export\s*(?:type\s+)?\{([^}]*)\}"));
static SCRIPT_EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$"));
static RUST_USE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^[ \t]*(pub(?:\s*\([^)]*\))?\s+)?use\s+([^;]+);"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Script,
    Rust,
    /// Prose and data files carry no declarations
    Plain,
}

impl Family {
    fn of(language: Language) -> Self {
        match language {
            Language::Rust => Self::Rust,
            Language::Markdown
            | Language::Text
            | Language::Json
            | Language::Yaml
            | Language::Toml => Self::Plain,
            _ => Self::Script,
        }
    }
}

/// Regex-driven extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for PatternExtractor {
    fn extract(&self, source: &str, language: Language, options: ExtractOptions) -> Extraction {
        let family = Family::of(language);
        let mut extraction = Extraction::default();

        let decls: &[DeclPattern] = match family {
            Family::Script => &SCRIPT_DECLS,
            Family::Rust => &RUST_DECLS,
            Family::Plain => return extraction,
        };

        // Declarations are always scanned: exports are derived from them.
        let symbols = extract_declarations(source, decls, family);

        if options.imports {
            let imports = match family {
                Family::Script => script_imports(source),
                Family::Rust => rust_uses(source, false),
                Family::Plain => Vec::new(),
            };
            extraction.imports = dedup(imports);
        }

        if options.exports {
            let mut exports: Vec<String> = symbols
                .iter()
                .filter(|s| s.exported)
                .map(|s| s.name.clone())
                .collect();
            match family {
                Family::Script => exports.extend(script_exports(source)),
                Family::Rust => exports.extend(rust_uses(source, true)),
                Family::Plain => {}
            }
            extraction.exports = dedup(exports);
        }

        if options.symbols {
            extraction.symbols = symbols;
        }

        extraction
    }
}

fn extract_declarations(source: &str, decls: &[DeclPattern], family: Family) -> Vec<ExtractedSymbol> {
    let mut symbols = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
            continue;
        }

        for pattern in decls {
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            let Some(name) = caps.get(1) else {
                continue;
            };
            if RESERVED_NAMES.contains(&name.as_str()) {
                continue;
            }

            let exported = match family {
                Family::Script => trimmed.starts_with("export"),
                Family::Rust => trimmed.starts_with("pub "),
                Family::Plain => false,
            };

            let start_col = name.start() + 1;
            symbols.push(ExtractedSymbol {
                name: name.as_str().to_string(),
                kind: pattern.kind,
                start_line: idx + 1,
                start_col,
                end_line: idx + 1,
                end_col: start_col + name.as_str().len(),
                exported,
                signature: truncate(line.trim(), MAX_SIGNATURE_CHARS),
            });
        }
    }

    symbols
}

fn script_imports(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in SCRIPT_IMPORT.captures_iter(source) {
        names.extend(parse_import_clause(&caps[1]));
    }
    for caps in SCRIPT_REQUIRE.captures_iter(source) {
        names.extend(parse_import_clause(&caps[1]));
    }
    names
}

/// Parse `Default, { a, b as c }`, `* as ns` or `{ a }` into imported names.
///
/// Aliased imports record the original name, which is what the exporting
/// file declares.
fn parse_import_clause(clause: &str) -> Vec<String> {
    let mut names = Vec::new();
    let (outside, inside) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => {
            (format!("{} {}", &clause[..open], &clause[close + 1..]), Some(&clause[open + 1..close]))
        }
        _ => (clause.to_string(), None),
    };

    for part in outside.split(',') {
        let part = part.trim();
        if let Some(ns) = part.strip_prefix("* as ") {
            push_identifier(&mut names, ns.trim());
        } else {
            push_identifier(&mut names, part);
        }
    }

    if let Some(inside) = inside {
        for item in inside.split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            let original = item.split(" as ").next().unwrap_or(item).trim();
            // `{ a: b }` in a require destructure
            let original = original.split(':').next().unwrap_or(original).trim();
            push_identifier(&mut names, original);
        }
    }

    names
}

fn script_exports(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in SCRIPT_EXPORT_LIST.captures_iter(source) {
        for item in caps[1].split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
            push_identifier(&mut names, exported);
        }
    }
    for caps in SCRIPT_EXPORT_DEFAULT.captures_iter(source) {
        push_identifier(&mut names, &caps[1]);
    }
    names
}

/// Names brought in by `use` declarations. With `public_only`, only
/// re-exports (`pub use`) are returned.
fn rust_uses(source: &str, public_only: bool) -> Vec<String> {
    let mut names = Vec::new();
    for caps in RUST_USE.captures_iter(source) {
        let is_pub = caps.get(1).is_some_and(|m| m.as_str().trim() == "pub");
        if public_only && !is_pub {
            continue;
        }
        flatten_use_tree(&caps[2], &mut names);
    }
    names
}

fn flatten_use_tree(tree: &str, names: &mut Vec<String>) {
    let tree = tree.trim();
    match (tree.find('{'), tree.rfind('}')) {
        (Some(open), Some(close)) if open < close => {
            let inner = &tree[open + 1..close];
            for item in split_top_level(inner) {
                flatten_use_tree(item, names);
            }
        }
        _ => {
            // `Name as Alias` records the original name
            let last = tree.rsplit("::").next().unwrap_or(tree);
            let original = last.split_whitespace().next().unwrap_or_default();
            if original != "*" && original != "self" {
                push_identifier(names, original);
            }
        }
    }
}

/// Split on commas that are not nested inside braces.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn push_identifier(names: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && candidate.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if valid {
        names.push(candidate.to_string());
    }
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}
