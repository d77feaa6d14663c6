//! Citation handling: `[SOURCE k]` rewriting and source-list formatting.
//!
//! The rewriter works on a stream of text deltas. It keeps a small lookahead
//! buffer from the last unmatched `[` so a citation token split across
//! deltas is never emitted half-written. Recognized tokens become `[k](url)`
//! links (or bare `[k]` when the source has no URL); tokens referencing
//! unknown sources are stripped; consecutive duplicate citations collapse to
//! one.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::settings::FileserverSettings;
use crate::retriever::RankedChunk;

/// How much pending text we hold while waiting for a citation to complete.
const MAX_PENDING: usize = 64;

/// A deduplicated, display-ready view of a retrieved chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    pub id: usize,
    pub title: String,
    pub url: String,
    pub text: String,
    pub section_path: Vec<String>,
}

impl SourceRef {
    /// The `[SOURCE n] title — section path` line heading a knowledge-base
    /// entry.
    pub fn header_line(&self) -> String {
        if self.section_path.is_empty() {
            format!("[SOURCE {}] {}", self.id, self.title)
        } else {
            format!(
                "[SOURCE {}] {} — {}",
                self.id,
                self.title,
                self.section_path.join(" / ")
            )
        }
    }
}

/// Render sources as a citable knowledge section: one `[SOURCE n]` header
/// line per source, followed by its text.
pub fn knowledge_section(sources: &[SourceRef]) -> String {
    sources
        .iter()
        .map(|s| format!("{}\n{}", s.header_line(), s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Resolve the browser-facing URL for a chunk. Chunks carrying a content
/// hash resolve through the fileserver's download endpoint; URLs under the
/// fileserver-internal base are rewritten to the public base; anything else
/// passes through. Internal URLs must never reach the client.
pub fn resolve_public_url(raw: &str, hash: Option<&str>, fs: &FileserverSettings) -> String {
    let public_base = fs.public_base_url().trim_end_matches('/');
    if let Some(hash) = hash {
        return format!("{public_base}/download/{hash}");
    }
    let internal_base = fs.base_url.trim_end_matches('/');
    if let Some(rest) = raw.strip_prefix(internal_base) {
        return format!("{public_base}{rest}");
    }
    raw.to_string()
}

/// Number retrieved chunks into display sources, starting at `start_id`.
pub fn sources_from_chunks(
    chunks: &[RankedChunk],
    start_id: usize,
    fs: &FileserverSettings,
) -> Vec<SourceRef> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let url = if chunk.payload.source_url.is_empty() && chunk.payload.hash.is_none() {
                String::new()
            } else {
                resolve_public_url(&chunk.payload.source_url, chunk.payload.hash.as_deref(), fs)
            };
            let title = if chunk.payload.title.is_empty() {
                "Document sans titre".to_string()
            } else {
                chunk.payload.title.clone()
            };
            SourceRef {
                id: start_id + i,
                title,
                url,
                text: chunk.payload.text.clone(),
                section_path: chunk.payload.section_path.clone(),
            }
        })
        .collect()
}

/// Newline-separated `[k] title — public_url` list, first-use order,
/// duplicate URLs collapsed to the entry with the lowest index.
pub fn format_sources(used: &[&SourceRef]) -> String {
    let mut seen_urls = HashSet::new();
    let mut lines = Vec::new();
    for source in used {
        if !source.url.is_empty() && !seen_urls.insert(source.url.clone()) {
            continue;
        }
        let target = if source.url.is_empty() {
            "(no url)"
        } else {
            source.url.as_str()
        };
        lines.push(format!("[{}] {} — {}", source.id, source.title, target));
    }
    lines.join("\n")
}

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^\[\s*source\s+(\d+)\s*\]$").unwrap())
}

/// True while the buffer (starting at `[`) could still grow into a
/// `[SOURCE k]` token.
fn may_become_citation(buffer: &str) -> bool {
    const WORD: [char; 6] = ['s', 'o', 'u', 'r', 'c', 'e'];

    let mut chars = buffer.chars();
    if chars.next() != Some('[') {
        return false;
    }

    // leading ws -> "source" -> ws -> digits -> trailing ws
    let mut state = 0;
    let mut word_pos = 0;
    for c in chars {
        match state {
            0 => {
                if c.is_whitespace() {
                    continue;
                }
                if c.to_ascii_lowercase() == WORD[0] {
                    state = 1;
                    word_pos = 1;
                } else {
                    return false;
                }
            }
            1 => {
                if word_pos < WORD.len() && c.to_ascii_lowercase() == WORD[word_pos] {
                    word_pos += 1;
                } else if word_pos == WORD.len() && c.is_whitespace() {
                    state = 2;
                } else {
                    return false;
                }
            }
            2 => {
                if c.is_whitespace() {
                    continue;
                }
                if c.is_ascii_digit() {
                    state = 3;
                } else {
                    return false;
                }
            }
            3 => {
                if c.is_ascii_digit() {
                    continue;
                }
                if c.is_whitespace() {
                    state = 4;
                } else {
                    return false;
                }
            }
            _ => {
                if !c.is_whitespace() {
                    return false;
                }
            }
        }
    }
    true
}

pub struct CitationRewriter {
    sources: Vec<SourceRef>,
    used: Vec<usize>,
    buffer: String,
    last_citation: Option<String>,
}

impl CitationRewriter {
    pub fn new(sources: &[SourceRef]) -> Self {
        Self {
            sources: sources.to_vec(),
            used: Vec::new(),
            buffer: String::new(),
            last_citation: None,
        }
    }

    /// Feed one delta; returns the text that is safe to emit now.
    pub fn push(&mut self, delta: &str) -> String {
        self.buffer.push_str(delta);
        let mut out = String::new();
        self.drain_buffer(&mut out, false);
        out
    }

    /// Flush everything after the stream closes. An incomplete trailing
    /// token can no longer complete and is emitted verbatim.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        self.drain_buffer(&mut out, true);
        out
    }

    /// Sources actually cited, in first-use order.
    pub fn used_sources(&self) -> Vec<&SourceRef> {
        self.used
            .iter()
            .filter_map(|id| self.sources.iter().find(|s| s.id == *id))
            .collect()
    }

    fn drain_buffer(&mut self, out: &mut String, finishing: bool) {
        loop {
            let Some(open) = self.buffer.find('[') else {
                let rest = std::mem::take(&mut self.buffer);
                self.emit_text(out, &rest);
                return;
            };

            let before: String = self.buffer[..open].to_string();
            self.emit_text(out, &before);
            self.buffer.drain(..open);

            match self.buffer.find(']') {
                Some(close) => {
                    let token: String = self.buffer[..=close].to_string();
                    if let Some(caps) = citation_pattern().captures(&token) {
                        let k: usize = caps[1].parse().unwrap_or(0);
                        self.buffer.drain(..=close);
                        self.emit_citation(out, k);
                    } else {
                        // Not a citation: release the bracket and rescan the rest.
                        self.emit_text(out, "[");
                        self.buffer.drain(..1);
                    }
                }
                None => {
                    if !finishing
                        && may_become_citation(&self.buffer)
                        && self.buffer.len() <= MAX_PENDING
                    {
                        return; // wait for more input
                    }
                    self.emit_text(out, "[");
                    self.buffer.drain(..1);
                }
            }
        }
    }

    fn emit_text(&mut self, out: &mut String, text: &str) {
        if text.chars().any(|c| !c.is_whitespace()) {
            self.last_citation = None;
        }
        out.push_str(text);
    }

    fn emit_citation(&mut self, out: &mut String, k: usize) {
        // Unknown source ids are stripped, surrounding text untouched.
        let Some(source) = self.sources.iter().find(|s| s.id == k) else {
            return;
        };
        if !self.used.contains(&k) {
            self.used.push(k);
        }
        let rendered = if source.url.is_empty() {
            format!("[{k}]")
        } else {
            format!("[{k}]({})", source.url)
        };
        if self.last_citation.as_deref() == Some(rendered.as_str()) {
            return; // consecutive duplicate citation
        }
        out.push_str(&rendered);
        self.last_citation = Some(rendered);
    }
}

/// Rewrite a complete text in one pass; returns the rewritten text and the
/// cited sources in first-use order.
pub fn rewrite_citations(text: &str, sources: &[SourceRef]) -> (String, Vec<SourceRef>) {
    let mut rewriter = CitationRewriter::new(sources);
    let mut out = rewriter.push(text);
    out.push_str(&rewriter.finish());
    let used = rewriter.used_sources().into_iter().cloned().collect();
    (out, used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::ChunkPayload;

    fn source(id: usize, url: &str) -> SourceRef {
        SourceRef {
            id,
            title: format!("Titre {id}"),
            url: url.to_string(),
            text: format!("texte {id}"),
            section_path: Vec::new(),
        }
    }

    fn three_sources() -> Vec<SourceRef> {
        vec![
            source(1, "http://pub/doc1"),
            source(2, "http://pub/doc2"),
            source(3, "http://pub/doc3"),
        ]
    }

    #[test]
    fn rewrites_token_split_across_deltas() {
        let sources = three_sources();
        let mut rewriter = CitationRewriter::new(&sources);
        let mut out = rewriter.push("See [SOUR");
        out.push_str(&rewriter.push("CE 2] and [SOURCE 9] ok"));
        out.push_str(&rewriter.finish());

        assert_eq!(out, "See [2](http://pub/doc2) and  ok");
        let used: Vec<usize> = rewriter.used_sources().iter().map(|s| s.id).collect();
        assert_eq!(used, vec![2]);
    }

    #[test]
    fn is_case_and_whitespace_tolerant() {
        let sources = three_sources();
        let (out, _) = rewrite_citations("a [ source 1 ] b [Source 3] c", &sources);
        assert_eq!(out, "a [1](http://pub/doc1) b [3](http://pub/doc3) c");
    }

    #[test]
    fn strips_unknown_sources_without_touching_whitespace() {
        let sources = three_sources();
        let (out, used) = rewrite_citations("avant [SOURCE 42] après", &sources);
        assert_eq!(out, "avant  après");
        assert!(used.is_empty());
    }

    #[test]
    fn leaves_non_citation_brackets_alone() {
        let sources = three_sources();
        let (out, _) = rewrite_citations("tableau [1] et [lien](x) et [SOURCE 1]", &sources);
        assert_eq!(out, "tableau [1] et [lien](x) et [1](http://pub/doc1)");
    }

    #[test]
    fn source_without_url_renders_bare_number() {
        let sources = vec![source(1, "")];
        let (out, used) = rewrite_citations("voir [SOURCE 1]", &sources);
        assert_eq!(out, "voir [1]");
        assert_eq!(used.len(), 1);
        assert_eq!(format_sources(&used.iter().collect::<Vec<_>>()),
            "[1] Titre 1 — (no url)");
    }

    #[test]
    fn collapses_consecutive_duplicate_citations() {
        let sources = three_sources();
        let (out, _) = rewrite_citations("fait [SOURCE 1] [SOURCE 1] puis", &sources);
        assert_eq!(out, "fait [1](http://pub/doc1)  puis");
    }

    #[test]
    fn duplicates_with_text_between_are_kept() {
        let sources = three_sources();
        let (out, _) = rewrite_citations("a [SOURCE 1] b [SOURCE 1]", &sources);
        assert_eq!(out, "a [1](http://pub/doc1) b [1](http://pub/doc1)");
    }

    #[test]
    fn incomplete_trailing_token_is_flushed_verbatim() {
        let sources = three_sources();
        let mut rewriter = CitationRewriter::new(&sources);
        let mut out = rewriter.push("fin [SOUR");
        assert_eq!(out, "fin ");
        out.push_str(&rewriter.finish());
        assert_eq!(out, "fin [SOUR");
    }

    #[test]
    fn oversized_pending_buffer_is_flushed() {
        let sources = three_sources();
        let mut rewriter = CitationRewriter::new(&sources);
        let long = format!("[SOURCE {}", "1".repeat(80));
        let out = rewriter.push(&long);
        assert_eq!(out, long);
        assert!(rewriter.finish().is_empty());
    }

    #[test]
    fn used_sources_follow_first_use_order() {
        let sources = three_sources();
        let (_, used) = rewrite_citations("x [SOURCE 3] y [SOURCE 1] z [SOURCE 3]", &sources);
        let ids: Vec<usize> = used.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn sources_list_collapses_duplicate_urls() {
        let a = source(1, "http://pub/same");
        let mut b = source(2, "http://pub/same");
        b.title = "Autre titre".to_string();
        let used = vec![&a, &b];
        let listing = format_sources(&used);
        assert_eq!(listing, "[1] Titre 1 — http://pub/same");
    }

    #[test]
    fn internal_fileserver_urls_are_rewritten() {
        let fs = FileserverSettings {
            base_url: "http://fileserver:7700".to_string(),
            public_url: Some("https://docs.example.com".to_string()),
        };
        assert_eq!(
            resolve_public_url("http://fileserver:7700/download/abc", None, &fs),
            "https://docs.example.com/download/abc"
        );
        assert_eq!(
            resolve_public_url("https://exterior.example.org/page", None, &fs),
            "https://exterior.example.org/page"
        );
        assert_eq!(
            resolve_public_url("ignored", Some("deadbeef"), &fs),
            "https://docs.example.com/download/deadbeef"
        );
    }

    #[test]
    fn chunks_become_numbered_sources_with_public_urls() {
        let fs = FileserverSettings {
            base_url: "http://fileserver:7700".to_string(),
            public_url: Some("https://docs.example.com".to_string()),
        };
        let chunk = RankedChunk {
            point_id: "p1".to_string(),
            payload: ChunkPayload {
                text: "contenu".to_string(),
                title: String::new(),
                source_url: "http://fileserver:7700/d/1".to_string(),
                section_path: vec!["Normes".to_string(), "Béton".to_string()],
                ..Default::default()
            },
            bm25_rank: Some(1),
            vector_rank: None,
            fused_score: 0.1,
        };
        let sources = sources_from_chunks(&[chunk], 1, &fs);
        assert_eq!(sources[0].id, 1);
        assert_eq!(sources[0].title, "Document sans titre");
        assert!(sources[0].url.starts_with("https://docs.example.com"));
        assert_eq!(sources[0].header_line(),
            "[SOURCE 1] Document sans titre — Normes / Béton");
    }
}
