//! The structured-block mini protocol agents use to request side
//! effects (new issues, dialogs, mentions) from inside a chat reply.
//!
//! A line-oriented parser that lets one model turn emit named side
//! effects (`@issue`, `@dialog`, `@mention`) inline with prose, without
//! committing the whole reply to JSON.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub type_name: String,
    pub fields: Vec<(String, String)>,
}

impl Block {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

const BLOCK_TYPES: &[&str] = &["mention", "dialog", "issue"];

fn block_header(line: &str) -> Option<&'static str> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('@')?;
    BLOCK_TYPES.iter().copied().find(|ty| rest == *ty)
}

/// Extracts structured blocks from agent reply text, returning the prose
/// with recognized blocks removed and the ordered list of parsed blocks.
/// Blocks that never reach a terminating `---` line are left embedded in
/// the returned prose (tolerant recovery).
pub fn extract(text: &str) -> (String, Vec<Block>) {
    let lines: Vec<&str> = text.lines().collect();
    let mut cleaned = Vec::new();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if let Some(type_name) = block_header(lines[i]) {
            // Scan ahead for a terminating "---" line.
            let mut j = i + 1;
            let mut terminated = false;
            while j < lines.len() {
                if lines[j].trim() == "---" {
                    terminated = true;
                    break;
                }
                j += 1;
            }

            if terminated {
                let fields = parse_body(&lines[i + 1..j]);
                blocks.push(Block { type_name: type_name.to_string(), fields });
                i = j + 1;
                continue;
            }
            // Unterminated: fall through and keep the header line as prose.
        }
        cleaned.push(lines[i]);
        i += 1;
    }

    (cleaned.join("\n"), blocks)
}

fn parse_body(lines: &[&str]) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        } else if let Some((_, last_value)) = fields.last_mut() {
            last_value.push(' ');
            last_value.push_str(line);
        }
        // A continuation line with no prior key is dropped silently;
        // there is nothing sensible to append it to.
    }
    fields
}
