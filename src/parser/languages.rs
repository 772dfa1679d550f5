//! Per-language grammar registry. Go, Python, JS/TS, Java at v1.
//!
//! Each language contributes its `tree_sitter::Language` plus the set of
//! node kinds that count as a function/method/class declaration, so the
//! generic walker in `parser::extract` doesn't need per-language branches.

use tree_sitter::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Go,
    Python,
    JavaScript,
    TypeScript,
    Java,
}

pub struct LanguageSpec {
    pub lang: Lang,
    pub function_node_kinds: &'static [&'static str],
    pub class_node_kinds: &'static [&'static str],
    pub import_node_kinds: &'static [&'static str],
    pub name_field: &'static str,
}

pub fn by_extension(path: &str) -> Option<LanguageSpec> {
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "go" => Some(LanguageSpec {
            lang: Lang::Go,
            function_node_kinds: &["function_declaration", "method_declaration"],
            class_node_kinds: &["type_declaration"],
            import_node_kinds: &["import_spec"],
            name_field: "name",
        }),
        "py" => Some(LanguageSpec {
            lang: Lang::Python,
            function_node_kinds: &["function_definition"],
            class_node_kinds: &["class_definition"],
            import_node_kinds: &["import_statement", "import_from_statement"],
            name_field: "name",
        }),
        "js" | "jsx" | "mjs" => Some(LanguageSpec {
            lang: Lang::JavaScript,
            function_node_kinds: &["function_declaration", "method_definition"],
            class_node_kinds: &["class_declaration"],
            import_node_kinds: &["import_statement"],
            name_field: "name",
        }),
        "ts" | "tsx" => Some(LanguageSpec {
            lang: Lang::TypeScript,
            function_node_kinds: &["function_declaration", "method_definition"],
            class_node_kinds: &["class_declaration", "interface_declaration"],
            import_node_kinds: &["import_statement"],
            name_field: "name",
        }),
        "java" => Some(LanguageSpec {
            lang: Lang::Java,
            function_node_kinds: &["method_declaration", "constructor_declaration"],
            class_node_kinds: &["class_declaration", "interface_declaration"],
            import_node_kinds: &["import_declaration"],
            name_field: "name",
        }),
        _ => None,
    }
}

pub fn grammar(lang: Lang) -> Language {
    match lang {
        Lang::Go => tree_sitter_go::LANGUAGE.into(),
        Lang::Python => tree_sitter_python::LANGUAGE.into(),
        Lang::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Lang::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Lang::Java => tree_sitter_java::LANGUAGE.into(),
    }
}

/// Generated-file skip heuristic: extension patterns plus a couple of
/// common generated-file stems.
pub fn is_generated(path: &str) -> bool {
    let patterns = [
        "*.pb.*",
        "*.min.*",
        "*.generated.*",
        "*.d.ts",
    ];
    let mut builder = globset::GlobSetBuilder::new();
    for p in patterns {
        if let Ok(glob) = globset::Glob::new(p) {
            builder.add(glob);
        }
    }
    match builder.build() {
        Ok(set) => set.is_match(path),
        Err(_) => false,
    }
}
