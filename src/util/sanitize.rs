/// Characters with meaning to shells or the version-control tool.
const STRIPPED: &[char] = &['`', '$', '"', '\'', '\\', ';', '&', '|', '<', '>'];

/// Makes `text` safe to pass as a commit message: drops control and
/// tool-significant characters, collapses whitespace and truncates to
/// `max_len` characters.
pub fn sanitize_commit_message(text: &str, max_len: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !STRIPPED.contains(c))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect::<String>().trim_end().to_string()
}
