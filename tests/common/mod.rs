#![allow(dead_code)]

use anyhow::{bail, Result};
use hwpx_edit::{
    config::Config,
    container,
    host::{AutomationHost, HostDiag},
    plan::{EditAction, ModificationPlan, PlanError, Planner},
};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn para(text: &str) -> String {
    format!("<hp:p><hp:run><hp:t>{}</hp:t></hp:run></hp:p>", escape(text))
}

pub fn table(rows: &[&[&str]]) -> String {
    let mut out = String::from("<hp:tbl>");
    for row in rows {
        out.push_str("<hp:tr>");
        for cell in *row {
            out.push_str(&format!(
                "<hp:tc><hp:subList>{}</hp:subList></hp:tc>",
                para(cell)
            ));
        }
        out.push_str("</hp:tr>");
    }
    out.push_str("</hp:tbl>");
    out
}

pub fn section_xml(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><hs:sec xmlns:hs="http://www.hancom.co.kr/hwpml/2011/section" xmlns:hp="http://www.hancom.co.kr/hwpml/2011/paragraph">{inner}</hs:sec>"#
    )
}

/// Writes a zip with the given parts.
pub fn write_zip(path: &Path, parts: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zw = zip::ZipWriter::new(file);
    for (name, body) in parts {
        zw.start_file(*name, SimpleFileOptions::default()).unwrap();
        zw.write_all(body.as_bytes()).unwrap();
    }
    zw.finish().unwrap();
}

pub fn write_container(path: &Path, inner: &str) {
    write_zip(
        path,
        &[
            ("mimetype", "application/hwp+zip"),
            ("Contents/section0.xml", &section_xml(inner)),
        ],
    );
}

/// One paragraph per line.
pub fn write_text_container(path: &Path, text: &str) {
    let inner: String = text.lines().map(para).collect();
    write_container(path, &inner);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(PathBuf),
    ExtractText,
    ReplaceAll(String, String),
    SaveAs(PathBuf, Option<String>),
    Close,
}

/// In-memory automation host. Opening loads the container's extracted text
/// (or the raw file for non-containers); saving writes a container when asked
/// for the container format and plain text otherwise.
#[derive(Default)]
pub struct FakeHost {
    pub calls: Vec<Call>,
    pub text: String,
    open: Option<PathBuf>,
    pub fail_open_containing: Option<String>,
    pub fail_replace_at: Option<usize>,
    pub fail_save: bool,
    replaces: usize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn replace_calls(&self) -> Vec<(String, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::ReplaceAll(f, r) => Some((f.clone(), r.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Open(_))).count()
    }

    pub fn close_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Close)).count()
    }
}

impl AutomationHost for FakeHost {
    fn doctor(&mut self) -> Result<HostDiag> {
        Ok(HostDiag {
            python_version: "fake".into(),
            host_available: true,
            host_version: None,
            error: None,
        })
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        self.calls.push(Call::Open(path.to_path_buf()));
        if let Some(open) = &self.open {
            bail!("session already open for {}", open.display());
        }
        if let Some(needle) = &self.fail_open_containing {
            if path.display().to_string().contains(needle.as_str()) {
                bail!("cannot open {}", path.display());
            }
        }
        let cfg = Config::default();
        self.text = match container::extract_markdown(&cfg.container, path) {
            Ok(text) => text,
            Err(_) => std::fs::read_to_string(path)?,
        };
        self.open = Some(path.to_path_buf());
        Ok(())
    }

    fn extract_text(&mut self) -> Result<String> {
        self.calls.push(Call::ExtractText);
        if self.open.is_none() {
            bail!("no open document");
        }
        Ok(self.text.clone())
    }

    fn replace_all(&mut self, find: &str, replace: &str) -> Result<()> {
        self.calls
            .push(Call::ReplaceAll(find.to_string(), replace.to_string()));
        if self.open.is_none() {
            bail!("no open document");
        }
        let index = self.replaces;
        self.replaces += 1;
        if self.fail_replace_at == Some(index) {
            bail!("replace {index} rejected");
        }
        self.text = self.text.replace(find, replace);
        Ok(())
    }

    fn save_as(&mut self, path: &Path, format: Option<&str>) -> Result<()> {
        self.calls
            .push(Call::SaveAs(path.to_path_buf(), format.map(str::to_string)));
        if self.open.is_none() {
            bail!("no open document");
        }
        if self.fail_save {
            // leave a truncated file behind, as a crashing host might
            std::fs::write(path, b"partial")?;
            bail!("disk full");
        }
        match format {
            Some("HWPX") => write_text_container(path, &self.text),
            _ => std::fs::write(path, &self.text)?,
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.push(Call::Close);
        self.open = None;
        Ok(())
    }
}

type ProposeFn = Box<dyn Fn(usize, &str, &str) -> Result<ModificationPlan, PlanError>>;

/// Planner with a scripted answer; the closure gets the 0-based call index.
pub struct StaticPlanner {
    respond: ProposeFn,
    calls: Cell<usize>,
    pub seen_text: RefCell<Vec<String>>,
}

impl StaticPlanner {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, &str, &str) -> Result<ModificationPlan, PlanError> + 'static,
    {
        Self {
            respond: Box::new(f),
            calls: Cell::new(0),
            seen_text: RefCell::new(Vec::new()),
        }
    }

    pub fn returning(pairs: &[(&str, &str)]) -> Self {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(f, r)| (f.to_string(), r.to_string()))
            .collect();
        Self::new(move |_, _, _| Ok(plan_of(&owned)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }
}

impl Planner for StaticPlanner {
    fn propose(
        &self,
        extracted_text: &str,
        instruction: &str,
    ) -> Result<ModificationPlan, PlanError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        self.seen_text.borrow_mut().push(extracted_text.to_string());
        (self.respond)(n, extracted_text, instruction)
    }
}

pub fn plan_of<S: AsRef<str>>(pairs: &[(S, S)]) -> ModificationPlan {
    ModificationPlan::new(
        pairs
            .iter()
            .map(|(f, r)| EditAction::new(f.as_ref(), r.as_ref()).unwrap())
            .collect(),
    )
}
