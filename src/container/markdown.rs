use super::{ContentBlock, Table};

pub fn render_table(table: &Table) -> String {
    let mut lines = Vec::with_capacity(table.rows().len() + 1);
    lines.push(render_row(table.header()));
    lines.push(render_row(&vec!["---"; table.column_count()]));
    for row in &table.rows()[1..] {
        lines.push(render_row(row));
    }
    lines.join("\n")
}

fn render_row<S: AsRef<str>>(cells: &[S]) -> String {
    let joined = cells
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(" | ");
    format!("| {joined} |")
}

/// Blank-line separated blocks in document order. Empty paragraphs render as nothing.
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Paragraph { text } if text.is_empty() => None,
            ContentBlock::Paragraph { text } => Some(text.clone()),
            ContentBlock::Table(t) => Some(render_table(t)),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
