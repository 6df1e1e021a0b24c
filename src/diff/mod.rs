use colored::Colorize;
use similar::TextDiff;

/// Unified line diff turning `old_sql` into `new_sql`. Empty when the two
/// are byte-identical.
pub fn unified_sql_diff(old_sql: &str, new_sql: &str, old_label: &str, new_label: &str) -> String {
    if !has_changes(old_sql, new_sql) {
        return String::new();
    }
    let diff = TextDiff::from_lines(old_sql, new_sql);
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string();
    text
}

/// Color a unified diff produced by `unified_sql_diff`.
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                line.bold().to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn has_changes(old_sql: &str, new_sql: &str) -> bool {
    old_sql != new_sql
}
