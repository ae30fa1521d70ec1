//! AST store and content filter (§4.5).
//!
//! The store never duplicates file bytes — `get` fetches content live
//! from the content store — and the content filter walks whatever
//! event stream the parser produced (possibly empty, for a null parse)
//! to classify byte ranges as comment/string/template/code.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::content_store::ContentStore;
use crate::import_resolver::Language;
use crate::parsing::{NodeEvent, ParseTree};
use crate::types::{ByteRange, FileId};

struct AstEntry {
    tree: Arc<dyn ParseTree>,
    path: String,
    language: Option<Language>,
}

/// Holds one parsed tree per FileID. `store` replaces (and thereby
/// closes) any prior tree for that file; `remove_file` closes it.
#[derive(Default)]
pub struct AstStore {
    entries: DashMap<FileId, AstEntry>,
}

impl AstStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, file: FileId, tree: Arc<dyn ParseTree>, path: impl Into<String>, language: Option<Language>) {
        self.entries.insert(
            file,
            AstEntry {
                tree,
                path: path.into(),
                language,
            },
        );
    }

    /// Returns `(tree, content, path, language)`. Content is fetched
    /// from the content store, never duplicated by this store.
    pub fn get(&self, file: FileId, content_store: &ContentStore) -> Option<(Arc<dyn ParseTree>, Arc<[u8]>, String, Option<Language>)> {
        let entry = self.entries.get(&file)?;
        let content = content_store.content(file)?;
        Some((entry.tree.clone(), content, entry.path.clone(), entry.language))
    }

    pub fn remove_file(&self, file: FileId) {
        self.entries.remove(&file);
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.entries.contains_key(&file)
    }

    /// The language a file was parsed as, without touching its content.
    pub fn language_of(&self, file: FileId) -> Option<Language> {
        self.entries.get(&file).and_then(|e| e.language)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeTag {
    Comment,
    String,
    Template,
    Code,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedRange {
    pub range: ByteRange,
    pub tag: RangeTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateType {
    Sql,
    GraphQl,
    Html,
    Css,
    Markdown,
    Query,
    PlainTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFragment {
    pub range: ByteRange,
    pub content: String,
    pub template_type: TemplateType,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub comments: Vec<ByteRange>,
    pub strings: Vec<ByteRange>,
    pub templates: Vec<TemplateFragment>,
    /// Sorted, non-overlapping ranges covering everything not tagged
    /// comment/string, derived by subtraction over `[0, len(content))`.
    pub code_ranges: Vec<ByteRange>,
}

static TAGGED_TEMPLATE_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "sql", "SQL", "gql", "graphql", "GraphQL", "html", "HTML", "css", "CSS", "md", "markdown", "query",
        "mutation", "fragment", "safeHtml", "safeSQL",
    ]
    .into_iter()
    .collect()
});

fn is_comment_kind(kind: &str) -> bool {
    kind.contains("comment")
}

fn is_template_kind(kind: &str) -> bool {
    kind.contains("template_string") || kind.contains("template_literal")
}

fn is_string_kind(kind: &str) -> bool {
    (kind.contains("string") || kind == "char_literal") && !is_template_kind(kind)
}

fn template_type_for_tag(tag: &str) -> TemplateType {
    match tag {
        "sql" | "SQL" | "safeSQL" => TemplateType::Sql,
        "gql" | "graphql" | "GraphQL" | "query" | "mutation" | "fragment" => TemplateType::GraphQl,
        "html" | "HTML" | "safeHtml" => TemplateType::Html,
        "css" | "CSS" => TemplateType::Css,
        "md" | "markdown" => TemplateType::Markdown,
        _ => TemplateType::PlainTemplate,
    }
}

/// Join a template literal's contiguous literal fragments, dropping
/// every `${...}` interpolation (brace-depth tracked so a `}` inside a
/// nested object literal doesn't close the interpolation early).
fn strip_interpolations(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let mut depth = 1;
            i += 2;
            while i < bytes.len() && depth > 0 {
                match bytes[i] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                i += 1;
            }
            continue;
        }
        let ch_len = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Identifier immediately preceding a template literal's opening
/// backtick, e.g. the `sql` in `` sql`SELECT ...` ``.
fn tagged_identifier_before(content: &[u8], template_start: u32) -> Option<String> {
    let start = template_start as usize;
    if start == 0 {
        return None;
    }
    let mut end = start;
    while end > 0 && content[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let ident_end = end;
    let mut ident_start = ident_end;
    while ident_start > 0 && (content[ident_start - 1].is_ascii_alphanumeric() || content[ident_start - 1] == b'_') {
        ident_start -= 1;
    }
    if ident_start == ident_end {
        return None;
    }
    String::from_utf8(content[ident_start..ident_end].to_vec()).ok()
}

/// Walk `tree`'s event stream and classify byte ranges. A tree with no
/// events (null parse) yields an all-code result.
pub fn filter(content: &[u8], tree: &dyn ParseTree) -> FilterResult {
    let mut comments = Vec::new();
    let mut strings = Vec::new();
    let mut templates = Vec::new();

    for event in tree.events() {
        let NodeEvent::Enter(info) = event else { continue };
        if is_comment_kind(&info.kind) {
            comments.push(info.range);
        } else if is_template_kind(&info.kind) {
            let raw = &content[info.range.start as usize..info.range.end.min(content.len() as u32) as usize];
            let text = strip_interpolations(String::from_utf8_lossy(raw).trim_matches('`'));
            let tag = tagged_identifier_before(content, info.range.start).filter(|t| TAGGED_TEMPLATE_NAMES.contains(t.as_str()));
            let template_type = tag.as_deref().map(template_type_for_tag).unwrap_or_else(|| {
                if looks_like_sql(&text) {
                    TemplateType::Sql
                } else if looks_like_graphql(&text) {
                    TemplateType::GraphQl
                } else {
                    TemplateType::PlainTemplate
                }
            });
            templates.push(TemplateFragment {
                range: info.range,
                content: text,
                template_type,
                tag,
            });
        } else if is_string_kind(&info.kind) {
            strings.push(info.range);
        }
    }

    let code_ranges = subtract_ranges(content.len() as u32, &comments, &strings);

    FilterResult {
        comments,
        strings,
        templates,
        code_ranges,
    }
}

/// Sorted subtraction of `a ∪ b` over `[0, len)`.
fn subtract_ranges(len: u32, a: &[ByteRange], b: &[ByteRange]) -> Vec<ByteRange> {
    let mut excluded: Vec<ByteRange> = a.iter().chain(b.iter()).copied().collect();
    excluded.sort_by_key(|r| r.start);

    let mut merged: Vec<ByteRange> = Vec::new();
    for range in excluded {
        if let Some(last) = merged.last_mut() {
            if range.start <= last.end {
                last.end = last.end.max(range.end);
                continue;
            }
        }
        merged.push(range);
    }

    let mut code_ranges = Vec::new();
    let mut cursor = 0u32;
    for range in merged {
        if range.start > cursor {
            code_ranges.push(ByteRange::new(cursor, range.start));
        }
        cursor = cursor.max(range.end);
    }
    if cursor < len {
        code_ranges.push(ByteRange::new(cursor, len));
    }
    code_ranges
}

const SQL_KEYWORDS: &[&str] = &["select", "insert into", "update", "delete from", "create table", "where", "from"];

pub fn looks_like_sql(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    SQL_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count() >= 2
}

pub fn looks_like_graphql(text: &str) -> bool {
    let trimmed = text.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    (lower.starts_with("query") || lower.starts_with("mutation") || lower.starts_with("fragment") || lower.starts_with('{'))
        && text.contains('{')
        && text.contains('}')
}
