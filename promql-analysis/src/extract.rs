//! Locating PromQL queries inside documents
//!
//! A plain PromQL document is a single query. A YAML rules file embeds one query per `expr:`
//! key. [`regions`] yields the byte ranges of those queries lazily, in document order, without
//! parsing any PromQL.
//!
//! Supported `expr:` value styles:
//!
//! ```yaml
//! expr: rate(http_requests_total[5m])       # plain, trailing comment excluded
//! expr: "up == 0"                           # quoted, region is between the quotes
//! expr: |                                   # block scalar (`|`, `>`, with chomping)
//!   sum by (job) (
//!     rate(http_requests_total[5m])
//!   )
//! ```

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    PromQl,
    Yaml,
}

impl DocumentKind {
    /// Pick the kind from the editor's language id, falling back to the file extension.
    pub fn detect(language_id: Option<&str>, path: &str) -> Self {
        match language_id.map(str::to_ascii_lowercase).as_deref() {
            Some("promql") => return DocumentKind::PromQl,
            Some("yaml") | Some("yml") => return DocumentKind::Yaml,
            _ => {}
        }
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentKind::Yaml
            }
            _ => DocumentKind::PromQl,
        }
    }
}

/// A query embedded in a document: `text` is `document[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl<'a> Region<'a> {
    fn new(document: &'a str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: &document[start..end],
        }
    }
}

pub fn regions(kind: DocumentKind, text: &str) -> Regions<'_> {
    match kind {
        DocumentKind::PromQl => Regions::Single(Some(Region::new(text, 0, text.len()))),
        DocumentKind::Yaml => Regions::Yaml(YamlRegions { text, pos: 0 }),
    }
}

pub enum Regions<'a> {
    Single(Option<Region<'a>>),
    Yaml(YamlRegions<'a>),
}

impl<'a> Iterator for Regions<'a> {
    type Item = Region<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Regions::Single(region) => region.take(),
            Regions::Yaml(yaml) => yaml.next(),
        }
    }
}

/// Line oriented scan for `expr:` keys. `pos` is always the start of the next unread line.
pub struct YamlRegions<'a> {
    text: &'a str,
    pos: usize,
}

/// One physical line: `start..end` excludes the line break, `next` is where the following
/// line starts.
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    end: usize,
    next: usize,
}

impl<'a> YamlRegions<'a> {
    fn line_at(&self, start: usize) -> Option<Line> {
        if start >= self.text.len() {
            return None;
        }
        let rest = &self.text[start..];
        let (mut end, next) = match rest.find('\n') {
            Some(index) => (start + index, start + index + 1),
            None => (self.text.len(), self.text.len()),
        };
        if end > start && self.text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some(Line { start, end, next })
    }

    fn content(&self, line: Line) -> &'a str {
        &self.text[line.start..line.end]
    }

    /// If `line` holds an `expr:` key, return the key column and the offset just past `:`.
    fn expr_key(&self, line: Line) -> Option<(usize, usize)> {
        let content = self.content(line);
        let mut column = content.len() - content.trim_start_matches(' ').len();
        // Skip sequence markers, as in `- expr: up`.
        while content[column..].starts_with("- ") {
            column += 2;
            column += content[column..].len() - content[column..].trim_start_matches(' ').len();
        }
        let rest = &content[column..];
        let after_key = rest
            .strip_prefix("expr")
            .or_else(|| rest.strip_prefix("\"expr\""))
            .or_else(|| rest.strip_prefix("'expr'"))?;
        let after_key = after_key.trim_start_matches(' ');
        let after_colon = after_key.strip_prefix(':')?;
        if !(after_colon.is_empty() || after_colon.starts_with([' ', '\t'])) {
            return None;
        }
        let colon = line.start + (content.len() - after_colon.len());
        Some((column, colon))
    }

    /// Continuation lines indented deeper than `key_column`, starting at `from`. Returns the
    /// region covering their content and the start of the first line after the block.
    fn block(&self, from: usize, key_column: usize) -> (Option<(usize, usize)>, usize) {
        let mut pos = from;
        let mut bounds: Option<(usize, usize)> = None;
        while let Some(line) = self.line_at(pos) {
            let content = self.content(line);
            if content.trim().is_empty() {
                pos = line.next;
                continue;
            }
            let indent = content.len() - content.trim_start_matches(' ').len();
            if indent <= key_column {
                break;
            }
            let start = bounds.map_or(line.start + indent, |(start, _)| start);
            bounds = Some((start, line.start + content.trim_end().len()));
            pos = line.next;
        }
        // Resume right after the last content line so trailing blanks are rescanned.
        let resume = match bounds {
            Some((_, end)) => self.line_at(end).map_or(self.text.len(), |line| line.next),
            None => from,
        };
        (bounds, resume.max(from))
    }

    fn region_for(&mut self, line: Line, key_column: usize, colon: usize) -> Option<Region<'a>> {
        let value_text = &self.text[colon..line.end];
        let value_start = colon + (value_text.len() - value_text.trim_start().len());
        let value = &self.text[value_start..line.end];

        if value.is_empty() || value.starts_with('#') {
            // Plain scalar continued on the following, deeper indented lines.
            let (bounds, resume) = self.block(line.next, key_column);
            self.pos = resume;
            return bounds.map(|(start, end)| Region::new(self.text, start, end));
        }

        if value.starts_with('|') || value.starts_with('>') {
            let (bounds, resume) = self.block(line.next, key_column);
            self.pos = resume;
            return Some(match bounds {
                Some((start, end)) => Region::new(self.text, start, end),
                None => Region::new(self.text, line.end, line.end),
            });
        }

        self.pos = line.next;
        if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let content_start = value_start + 1;
            let content = &self.text[content_start..line.end];
            let close = closing_quote(content, quote).unwrap_or(content.len());
            return Some(Region::new(self.text, content_start, content_start + close));
        }

        let end = plain_scalar_end(value);
        Some(Region::new(self.text, value_start, value_start + end))
    }
}

impl<'a> Iterator for YamlRegions<'a> {
    type Item = Region<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.line_at(self.pos) {
            let Some((key_column, colon)) = self.expr_key(line) else {
                self.pos = line.next;
                continue;
            };
            if let Some(region) = self.region_for(line, key_column, colon) {
                return Some(region);
            }
        }
        None
    }
}

/// Byte index of the quote closing a scalar whose content is `content`.
fn closing_quote(content: &str, quote: char) -> Option<usize> {
    let bytes = content.as_bytes();
    let quote = quote as u8;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if quote == b'"' && byte == b'\\' {
            index += 2;
            continue;
        }
        if byte == quote {
            // '' is an escaped quote inside a single quoted scalar.
            if quote == b'\'' && bytes.get(index + 1) == Some(&b'\'') {
                index += 2;
                continue;
            }
            return Some(index);
        }
        index += 1;
    }
    None
}

/// Length of a plain scalar, stopping at a ` #` comment and trimming trailing whitespace.
fn plain_scalar_end(value: &str) -> usize {
    let bytes = value.as_bytes();
    let mut end = value.len();
    for index in 1..bytes.len() {
        if bytes[index] == b'#' && matches!(bytes[index - 1], b' ' | b'\t') {
            end = index;
            break;
        }
    }
    value[..end].trim_end().len()
}
