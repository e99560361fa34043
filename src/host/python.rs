use super::{types::*, AutomationHost};
use crate::config;
use anyhow::{anyhow, bail, Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Drives the automation host through a Python bridge script that speaks one
/// JSON object per line. A session is one bridge process: `open` spawns it,
/// `close` asks it to quit and reaps it.
pub struct PythonHost {
    cfg: config::Host,
    script: PathBuf,
    session: Option<Session>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_thread: Option<JoinHandle<()>>,
    document: PathBuf,
}

impl PythonHost {
    pub fn new(cfg: &config::Host) -> Result<Self> {
        let script = PathBuf::from(&cfg.script);
        if !script.exists() {
            return Err(anyhow!("missing host script: {}", script.display()));
        }
        Ok(Self {
            cfg: cfg.clone(),
            script,
            session: None,
        })
    }

    fn spawn(&self, document: &Path) -> Result<Session> {
        debug!("spawning host bridge {} for {}", self.script.display(), document.display());
        let mut cmd = Command::new(&self.cfg.python_exe);
        cmd.arg(&self.script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env("PYTHONIOENCODING", "utf-8");
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning host bridge: {}", self.script.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

        // Keep stderr drained so a chatty host can't block on a full pipe.
        let stderr_thread = child.stderr.take().map(|err| {
            std::thread::spawn(move || {
                for line in BufReader::new(err).lines().map_while(|l| l.ok()) {
                    debug!(target: "hwp_host", "{}", line.trim_end());
                }
            })
        });

        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_thread,
            document: document.to_path_buf(),
        })
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| anyhow!("no open host session"))
    }
}

impl Session {
    fn call(&mut self, req: &HostRequest) -> Result<HostReply> {
        let line = serde_json::to_string(req)?;
        debug!("host <- {}", abbreviate(&line));
        writeln!(self.stdin, "{line}").with_context(|| "writing to host bridge")?;
        self.stdin.flush().with_context(|| "flushing host bridge stdin")?;

        let mut buf = String::new();
        let n = self
            .stdout
            .read_line(&mut buf)
            .with_context(|| "reading from host bridge")?;
        if n == 0 {
            bail!("host bridge exited without replying");
        }
        debug!("host -> {}", abbreviate(buf.trim_end()));

        let reply: HostReply = serde_json::from_str(buf.trim_end())
            .with_context(|| "parsing host bridge reply")?;
        if !reply.ok {
            bail!(
                "host error: {}",
                reply.error.as_deref().unwrap_or("unspecified failure")
            );
        }
        Ok(reply)
    }

    fn finish(self) -> Result<()> {
        let Session {
            mut child,
            stdin,
            stderr_thread,
            ..
        } = self;
        drop(stdin);
        let status = child.wait().with_context(|| "waiting for host bridge")?;
        if let Some(t) = stderr_thread {
            let _ = t.join();
        }
        if !status.success() {
            warn!("host bridge exited with {status}");
        }
        Ok(())
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl AutomationHost for PythonHost {
    fn doctor(&mut self) -> Result<HostDiag> {
        if self.session.is_some() {
            bail!("cannot run doctor while a session is open");
        }
        let mut s = self.spawn(Path::new("<doctor>"))?;
        let reply = s.call(&HostRequest::Doctor);
        let _ = s.call(&HostRequest::Close);
        s.finish()?;
        reply?
            .diag
            .ok_or_else(|| anyhow!("host bridge returned no diagnostics"))
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        if let Some(s) = &self.session {
            bail!(
                "host session already open for {}; close it first",
                s.document.display()
            );
        }
        let abs = std::path::absolute(path)
            .with_context(|| format!("absolute path: {}", path.display()))?;
        let mut s = self.spawn(&abs)?;
        let req = HostRequest::Open {
            path: abs.display().to_string(),
            visible: self.cfg.visible,
        };
        match s.call(&req) {
            Ok(_) => {
                self.session = Some(s);
                Ok(())
            }
            Err(e) => {
                let _ = s.call(&HostRequest::Close);
                let _ = s.finish();
                Err(e.context(format!("opening {}", abs.display())))
            }
        }
    }

    fn extract_text(&mut self) -> Result<String> {
        let reply = self.session()?.call(&HostRequest::ExtractText)?;
        Ok(reply.text.unwrap_or_default())
    }

    fn replace_all(&mut self, find: &str, replace: &str) -> Result<()> {
        self.session()?.call(&HostRequest::ReplaceAll {
            find: find.to_string(),
            replace: replace.to_string(),
        })?;
        Ok(())
    }

    fn save_as(&mut self, path: &Path, format: Option<&str>) -> Result<()> {
        let abs = std::path::absolute(path)
            .with_context(|| format!("absolute path: {}", path.display()))?;
        self.session()?.call(&HostRequest::SaveAs {
            path: abs.display().to_string(),
            format: format.map(str::to_string),
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut s) = self.session.take() else {
            return Ok(());
        };
        let reply = s.call(&HostRequest::Close);
        match reply {
            Ok(_) => s.finish(),
            Err(e) => {
                s.kill();
                Err(e.context("closing host session"))
            }
        }
    }
}

impl Drop for PythonHost {
    fn drop(&mut self) {
        if let Some(s) = self.session.take() {
            warn!("host session for {} was not closed; killing bridge", s.document.display());
            s.kill();
        }
    }
}

fn abbreviate(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        return s.to_string();
    }
    let head: String = s.chars().take(MAX).collect();
    format!("{head}...")
}
