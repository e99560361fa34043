//! Structural parser for zipped-XML document containers.
//!
//! The primary body part is read from the archive, its body element located,
//! and each direct child turned into a [`ContentBlock`]: paragraphs become
//! text, tables become row/cell grids. Everything else is ignored.

pub mod markdown;
pub mod xml;

use crate::config::Container as ContainerConfig;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::{result::ZipError, ZipArchive};

pub use markdown::{render_blocks, render_table};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot open container {path}: {reason}")]
    Archive { path: String, reason: String },
    #[error("missing or malformed body part {part}: {reason}")]
    MissingBody { part: String, reason: String },
    #[error("malformed table #{table}: row {row} has {found} cells, header has {expected}")]
    MalformedTable {
        table: usize,
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Paragraph { text: String },
    Table(Table),
}

/// A rectangular grid; every row has the header's column count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaggedRow {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

impl Table {
    /// `Ok(None)` for a table with no rows or an empty first row.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Result<Option<Table>, RaggedRow> {
        let expected = match rows.first() {
            Some(header) if !header.is_empty() => header.len(),
            _ => return Ok(None),
        };
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(RaggedRow {
                row,
                expected,
                found: r.len(),
            });
        }
        Ok(Some(Table { rows }))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn header(&self) -> &[String] {
        &self.rows[0]
    }

    pub fn column_count(&self) -> usize {
        self.rows[0].len()
    }
}

/// Trims and folds every newline run (with surrounding blanks) into one space.
pub fn clean_text(raw: &str) -> String {
    raw.trim()
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse(cfg: &ContainerConfig, path: &Path) -> Result<Vec<ContentBlock>, ParseError> {
    let xml = read_body_part(cfg, path)?;
    let blocks = parse_body_xml(cfg, &xml)?;
    debug!(
        "parsed {} blocks from {}",
        blocks.len(),
        path.display()
    );
    Ok(blocks)
}

/// Parses and renders in one step; the result is the text handed to the planner.
pub fn extract_markdown(cfg: &ContainerConfig, path: &Path) -> Result<String, ParseError> {
    Ok(render_blocks(&parse(cfg, path)?))
}

fn read_body_part(cfg: &ContainerConfig, path: &Path) -> Result<String, ParseError> {
    let archive_err = |reason: String| ParseError::Archive {
        path: path.display().to_string(),
        reason,
    };
    let body_err = |reason: String| ParseError::MissingBody {
        part: cfg.body_part.clone(),
        reason,
    };

    let file = File::open(path).map_err(|e| archive_err(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;
    let mut part = match archive.by_name(&cfg.body_part) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Err(body_err("part not found in archive".into())),
        Err(e) => return Err(body_err(e.to_string())),
    };

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| body_err(format!("read: {e}")))?;
    Ok(xml)
}

pub fn parse_body_xml(cfg: &ContainerConfig, xml: &str) -> Result<Vec<ContentBlock>, ParseError> {
    let body_err = |reason: String| ParseError::MissingBody {
        part: cfg.body_part.clone(),
        reason,
    };

    let root = xml::parse_tree(xml).map_err(|e| body_err(e.to_string()))?;
    let is_body = |e: &xml::Element| cfg.body_tags.iter().any(|t| *t == e.name);
    let body = root
        .find_first(&is_body)
        .ok_or_else(|| body_err(format!("no element named any of {:?}", cfg.body_tags)))?;

    let mut blocks = Vec::new();
    let mut table_index = 0usize;
    for child in body.child_elements() {
        if child.name == cfg.paragraph_tag {
            blocks.push(ContentBlock::Paragraph {
                text: clean_text(&child.text()),
            });
        } else if child.name == cfg.table_tag {
            let rows: Vec<Vec<String>> = child
                .child_elements()
                .filter(|tr| tr.name == cfg.row_tag)
                .map(|tr| {
                    tr.child_elements()
                        .filter(|tc| tc.name == cfg.cell_tag)
                        .map(|tc| clean_text(&tc.text()))
                        .collect()
                })
                .collect();
            match Table::from_rows(rows) {
                Ok(Some(table)) => blocks.push(ContentBlock::Table(table)),
                Ok(None) => debug!("table #{table_index} is empty; skipped"),
                Err(r) => {
                    return Err(ParseError::MalformedTable {
                        table: table_index,
                        row: r.row,
                        expected: r.expected,
                        found: r.found,
                    });
                }
            }
            table_index += 1;
        }
    }
    Ok(blocks)
}
