//! Flattens the legacy HTML description field into plain text for the
//! target item's body.

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Convert an HTML fragment to plain text: tags stripped, block boundaries
/// become spaces, named/numeric entities decoded, whitespace runs collapsed.
///
/// Inline tags join without inserting whitespace, so `wor<b>ld</b>` stays a
/// single word while `<p>a</p><p>b</p>` becomes `a b`.
pub fn html_to_text(input: &str) -> String {
    let mut stripped = String::with_capacity(input.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    stripped.push(' ');
                }
            }
            c if in_tag => tag.push(c),
            c => stripped.push(c),
        }
    }

    collapse_whitespace(&decode_entities(&stripped))
}

fn is_block_tag(raw: &str) -> bool {
    let name = raw
        .trim_start_matches('/')
        .trim()
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    BLOCK_TAGS.contains(&name.as_str())
}

/// Decode the handful of entities legacy CMS exports actually contain.
/// Anything unrecognized passes through verbatim.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        // entity names are short; give up past 8 bytes
        let end = rest[1..]
            .find(';')
            .filter(|&i| i <= 7)
            .map(|i| i + 1);
        let Some(end) = end else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let decoded = match &rest[1..end] {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" | "#39" => Some('\''),
            "nbsp" | "#160" => Some(' '),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_space = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
