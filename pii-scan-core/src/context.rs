//! Context Extractor (C2): crop a readable line around a detection while
//! masking every other detection on that line.

use crate::types::PiiType;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "nav", "aside", "blockquote", "pre", "table", "ul", "ol",
    "li", "dl", "dt", "dd", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "br",
];

/// One detection's span and type, as needed to mask a line.
#[derive(Clone, Copy, Debug)]
pub struct DetectionSpan {
    pub start: usize,
    pub end: usize,
    pub pii_type: PiiType,
}

#[derive(Clone, Copy, Debug)]
pub struct ContextBounds {
    pub max_length: usize,
    pub side_length: usize,
}

impl Default for ContextBounds {
    fn default() -> Self {
        Self { max_length: 240, side_length: 120 }
    }
}

/// Build the masked, truncated context for `source[primary.start..primary.end]`,
/// masking every detection in `all_detections` that falls on the same line.
/// Never panics: any internal failure (out-of-range offsets, non-UTF-8
/// boundary) falls back to returning the untouched source line, clamped to
/// `bounds.max_length` bytes at a char boundary.
pub fn extract_context(source: &str, all_detections: &[DetectionSpan], primary: DetectionSpan, bounds: ContextBounds) -> String {
    match try_extract(source, all_detections, primary, bounds) {
        Some(s) => s,
        None => fallback(source, bounds),
    }
}

fn fallback(source: &str, bounds: ContextBounds) -> String {
    let mut end = source.len().min(bounds.max_length);
    while end > 0 && !source.is_char_boundary(end) {
        end -= 1;
    }
    source[..end].trim().to_string()
}

fn try_extract(source: &str, all_detections: &[DetectionSpan], primary: DetectionSpan, bounds: ContextBounds) -> Option<String> {
    if primary.start >= primary.end || primary.end > source.len() {
        return None;
    }

    let markup = is_markup(source);
    let line_start = find_line_start(source, primary.start, markup);
    let line_end = find_line_end(source, primary.end, markup);
    if line_start > line_end || line_end > source.len() {
        return None;
    }

    let raw_line = &source[line_start..line_end];
    let line = if markup { strip_tags(raw_line) } else { raw_line.to_string() };

    // Re-locate detection offsets relative to the (possibly tag-stripped) line.
    let line_detections = clamp_to_line(raw_line, &line, line_start, all_detections, markup);
    let (masked, primary_token_offset) = mask_line(&line, &line_detections, primary.start.saturating_sub(line_start))?;

    let truncated = truncate_around(&masked, primary_token_offset, bounds);
    Some(collapse_whitespace(&truncated))
}

fn is_markup(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    BLOCK_TAGS.iter().any(|tag| lower.contains(&format!("<{tag}")) || lower.contains(&format!("</{tag}")))
}

fn find_line_start(source: &str, start: usize, markup: bool) -> usize {
    let head = &source[..start.min(source.len())];
    let newline_boundary = head.rfind('\n').map(|i| i + 1).unwrap_or(0);
    if !markup {
        return newline_boundary;
    }
    let tag_boundary = last_block_tag_close(head).unwrap_or(0);
    newline_boundary.max(tag_boundary)
}

fn find_line_end(source: &str, end: usize, markup: bool) -> usize {
    let end = end.min(source.len());
    let tail = &source[end..];
    let newline_boundary = tail.find('\n').map(|i| end + i).unwrap_or(source.len());
    if !markup {
        return newline_boundary;
    }
    let tag_boundary = first_block_tag_open(tail).map(|i| end + i).unwrap_or(source.len());
    newline_boundary.min(tag_boundary)
}

fn last_block_tag_close(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    BLOCK_TAGS
        .iter()
        .filter_map(|tag| {
            let open = format!("<{tag}");
            let close = format!("</{tag}");
            let mut best = None;
            for needle in [open.as_str(), close.as_str()] {
                if let Some(idx) = lower.rfind(needle) {
                    if let Some(rel_close) = lower[idx..].find('>') {
                        let end = idx + rel_close + 1;
                        best = Some(best.map_or(end, |b: usize| b.max(end)));
                    }
                }
            }
            best
        })
        .max()
}

fn first_block_tag_open(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    BLOCK_TAGS
        .iter()
        .filter_map(|tag| {
            let open = format!("<{tag}");
            let close = format!("</{tag}");
            [lower.find(open.as_str()), lower.find(close.as_str())]
                .into_iter()
                .flatten()
                .min()
        })
        .min()
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Detections within a line, translated to offsets inside `line` (the
/// possibly tag-stripped text). Detections outside `[0, line.len()]` after
/// clamping are dropped.
fn clamp_to_line(raw_line: &str, line: &str, line_start: usize, detections: &[DetectionSpan], markup: bool) -> Vec<DetectionSpan> {
    detections
        .iter()
        .filter_map(|d| {
            if d.end <= line_start || d.start >= line_start + raw_line.len() {
                return None;
            }
            let s = d.start.saturating_sub(line_start).min(raw_line.len());
            let e = d.end.saturating_sub(line_start).min(raw_line.len());
            if s >= e {
                return None;
            }
            if markup {
                // Tags are stripped to whitespace; offsets degrade to a
                // best-effort proportional mapping rather than exact
                // re-indexing through the stripped text.
                let ratio = line.len() as f64 / raw_line.len().max(1) as f64;
                let s2 = ((s as f64) * ratio) as usize;
                let e2 = (((e as f64) * ratio) as usize).max(s2 + 1).min(line.len());
                Some(DetectionSpan { start: s2, end: e2, pii_type: d.pii_type })
            } else {
                Some(DetectionSpan { start: s, end: e, pii_type: d.pii_type })
            }
        })
        .collect()
}

/// Walk left-to-right emitting `line[idx..s]` then `[TYPE]`, tracking the
/// byte offset where the primary detection's token lands in the output.
fn mask_line(line: &str, detections: &[DetectionSpan], primary_start_in_line: usize) -> Option<(String, usize)> {
    let mut sorted = detections.to_vec();
    sorted.sort_by_key(|d| d.start);

    let mut out = String::with_capacity(line.len());
    let mut idx = 0usize;
    let mut primary_token_offset = 0usize;

    for d in &sorted {
        let s = d.start.min(line.len());
        let e = d.end.min(line.len());
        if s < idx {
            continue;
        }
        if !line.is_char_boundary(s) || !line.is_char_boundary(e) {
            return None;
        }
        out.push_str(&line[idx..s]);
        if s <= primary_start_in_line && primary_start_in_line < e.max(s + 1) {
            primary_token_offset = out.len();
        }
        out.push('[');
        out.push_str(d.pii_type.label());
        out.push(']');
        idx = idx.max(e);
    }
    if idx <= line.len() {
        out.push_str(&line[idx..]);
    }
    Some((out, primary_token_offset))
}

fn truncate_around(masked: &str, primary_token_offset: usize, bounds: ContextBounds) -> String {
    if masked.len() <= bounds.max_length {
        return masked.to_string();
    }

    let center = primary_token_offset.min(masked.len());
    let mut window_start = center.saturating_sub(bounds.side_length);
    let mut window_end = (center + bounds.side_length).min(masked.len());

    while window_start > 0 && !masked.is_char_boundary(window_start) {
        window_start -= 1;
    }
    while window_end < masked.len() && !masked.is_char_boundary(window_end) {
        window_end += 1;
    }

    // Extend to the next whitespace without exceeding the cap.
    let extended_start = extend_to_whitespace_left(masked, window_start, bounds.max_length, window_end);
    let extended_end = extend_to_whitespace_right(masked, window_end, bounds.max_length, extended_start);

    let mut result = String::new();
    if extended_start > 0 {
        result.push('…');
    }
    result.push_str(masked[extended_start..extended_end].trim());
    if extended_end < masked.len() {
        result.push('…');
    }
    result
}

fn extend_to_whitespace_left(text: &str, mut start: usize, max_length: usize, end: usize) -> usize {
    let budget_floor = end.saturating_sub(max_length);
    while start > budget_floor {
        let prev = text[..start].char_indices().next_back();
        match prev {
            Some((i, ch)) if !ch.is_whitespace() => start = i,
            _ => break,
        }
    }
    start
}

fn extend_to_whitespace_right(text: &str, mut end: usize, max_length: usize, start: usize) -> usize {
    let budget_ceiling = (start + max_length).min(text.len());
    while end < budget_ceiling {
        let next = text[end..].chars().next();
        match next {
            Some(ch) if !ch.is_whitespace() => end += ch.len_utf8(),
            _ => break,
        }
    }
    end
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}
