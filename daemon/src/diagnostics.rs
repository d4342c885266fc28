use log::Level;

/// Line-oriented output for per-attempt failures and session summaries.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, level: Level, line: &str);
}

/// Forwards every line to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, level: Level, line: &str) {
        log::log!(level, "{}", line);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemorySink {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl MemorySink {
        pub fn lines(&self) -> Vec<(Level, String)> {
            self.lines.lock().unwrap().clone()
        }

        pub fn contains(&self, level: Level, needle: &str) -> bool {
            self.lines().iter().any(|(l, line)| *l == level && line.contains(needle))
        }
    }

    impl DiagnosticSink for MemorySink {
        fn emit(&self, level: Level, line: &str) {
            self.lines.lock().unwrap().push((level, line.to_string()));
        }
    }
}
