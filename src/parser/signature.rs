//! Signature normalization: strips whitespace and parameter names, keeps
//! types in source order, renders as `(T1,T2,T3)` so that
//! `login(u string, p string)` and `login(user:string, password:string)`
//! yield the same key, while `login(string)` and `login(string,string)`
//! remain distinct overloads.

/// A single formal parameter as extracted from source: the declared type
/// (possibly empty for untyped languages, where the literal parameter
/// position stands in for the type in the normalized form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParam {
    pub name: String,
    pub declared_type: Option<String>,
}

/// Produces the normalized signature string from the function's raw
/// parameter list.
pub fn normalize(params: &[RawParam]) -> String {
    let types: Vec<String> = params
        .iter()
        .map(|p| {
            p.declared_type
                .as_deref()
                .map(strip_whitespace)
                .unwrap_or_else(|| "_".to_string())
        })
        .collect();
    format!("({})", types.join(","))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
