//! Per-agent append-only log sinks.
//!
//! Three newline-delimited streams per agent under `logs/<session_code>/`:
//! `agent_*` (structured action log), `llm_*` (requests and raw replies),
//! `memory_*` (memory transitions). Files are truncated on agent start so a
//! run is self-contained, and appended with per-call open/close so no file
//! handle outlives a write.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

pub struct AgentLogSinks {
    agent_path: PathBuf,
    llm_path: PathBuf,
    memory_path: PathBuf,
    participant_code: String,
}

impl AgentLogSinks {
    /// Create (and truncate) the three sinks for one agent.
    pub fn new(root: &Path, session_code: &str, participant_code: &str) -> std::io::Result<Self> {
        let dir = root.join(session_code);
        std::fs::create_dir_all(&dir)?;
        let sinks = Self {
            agent_path: dir.join(format!("agent_{participant_code}.log")),
            llm_path: dir.join(format!("llm_{participant_code}.log")),
            memory_path: dir.join(format!("memory_{participant_code}.log")),
            participant_code: participant_code.to_owned(),
        };
        for path in [&sinks.agent_path, &sinks.llm_path, &sinks.memory_path] {
            std::fs::File::create(path)?;
        }
        Ok(sinks)
    }

    fn append(&self, path: &Path, line: &str) {
        let result = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            tracing::warn!(
                participant = %self.participant_code,
                path = %path.display(),
                error = %err,
                "log write failed"
            );
        }
    }

    /// One line in the structured action log.
    pub fn agent(&self, message: &str) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S");
        self.append(&self.agent_path, &format!("[{ts}] {message}"));
    }

    /// A headered block in the LLM log.
    pub fn llm(&self, header: &str, content: &str) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S");
        self.append(&self.llm_path, &format!("\n==== {ts} | {header} ====\n{content}"));
    }

    /// A headered block in the memory log.
    pub fn memory(&self, header: &str, content: &str) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S");
        self.append(
            &self.memory_path,
            &format!("\n==== {ts} | {header} ====\n{content}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_three_truncated_streams() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = AgentLogSinks::new(dir.path(), "DEMO001", "Alice").unwrap();
        sinks.agent("cycle #1");
        sinks.llm("REQUEST", "payload");
        sinks.memory("INITIALIZATION", "system prompt set");

        let base = dir.path().join("DEMO001");
        let agent = std::fs::read_to_string(base.join("agent_Alice.log")).unwrap();
        assert!(agent.contains("cycle #1"));
        let llm = std::fs::read_to_string(base.join("llm_Alice.log")).unwrap();
        assert!(llm.contains("| REQUEST ===="));
        let memory = std::fs::read_to_string(base.join("memory_Alice.log")).unwrap();
        assert!(memory.contains("INITIALIZATION"));
    }

    #[test]
    fn restart_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = AgentLogSinks::new(dir.path(), "DEMO001", "Alice").unwrap();
        sinks.agent("old run line");
        drop(sinks);

        let sinks = AgentLogSinks::new(dir.path(), "DEMO001", "Alice").unwrap();
        sinks.agent("new run line");
        let agent = std::fs::read_to_string(
            dir.path().join("DEMO001").join("agent_Alice.log"),
        )
        .unwrap();
        assert!(!agent.contains("old run line"));
        assert!(agent.contains("new run line"));
    }
}
