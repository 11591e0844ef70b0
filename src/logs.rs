//! Project-specific extraction of failure snippets from CI logs, for inline
//! inclusion in notification emails (C7).

/// The capability every extractor variant implements.
pub trait LogExtractor {
    /// Extract the portion of `raw_log` worth showing inline in a notification.
    fn extract(&self, raw_log: &str) -> String;
}

/// Returns the last `TAIL_LINES` lines of the raw log, unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

/// How many trailing lines [`DefaultExtractor`] keeps.
const TAIL_LINES: usize = 200;

impl LogExtractor for DefaultExtractor {
    fn extract(&self, raw_log: &str) -> String {
        let lines: Vec<&str> = raw_log.lines().collect();
        let start = lines.len().saturating_sub(TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Splits a BPF selftests log into per-test sections (delimited by `#<n> <name>`
/// headers) and keeps only the sections that reported `FAIL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BpfExtractor;

impl LogExtractor for BpfExtractor {
    fn extract(&self, raw_log: &str) -> String {
        let mut sections: Vec<Vec<&str>> = Vec::new();
        for line in raw_log.lines() {
            if line.starts_with('#') && line.chars().nth(1).is_some_and(|c| c.is_ascii_digit()) {
                sections.push(vec![line]);
            } else if let Some(last) = sections.last_mut() {
                last.push(line);
            }
        }

        let failing: Vec<String> = sections
            .into_iter()
            .filter(|section| section.iter().any(|line| line.contains("FAIL")))
            .map(|section| section.join("\n"))
            .collect();

        if failing.is_empty() {
            DefaultExtractor.extract(raw_log)
        } else {
            failing.join("\n\n")
        }
    }
}

/// Select the extractor variant for a project by name, per Design Note
/// "Polymorphic log extractor".
pub fn extractor_for_project(project: &str) -> Box<dyn LogExtractor + Send + Sync> {
    match project {
        "bpf" | "bpf-next" => Box::new(BpfExtractor),
        _ => Box::new(DefaultExtractor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extractor_keeps_tail_only() {
        let log = (0..300).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let extracted = DefaultExtractor.extract(&log);
        assert_eq!(extracted.lines().count(), TAIL_LINES);
        assert!(extracted.starts_with("line 100"));
    }

    #[test]
    fn bpf_extractor_keeps_only_failing_sections() {
        let log = "#1 test_a\nok\n#2 test_b\nFAIL: assertion\n#3 test_c\nok\n";
        let extracted = BpfExtractor.extract(log);
        assert!(extracted.contains("test_b"));
        assert!(!extracted.contains("test_a"));
        assert!(!extracted.contains("test_c"));
    }

    #[test]
    fn bpf_extractor_falls_back_to_tail_when_nothing_fails() {
        let log = "#1 test_a\nok\n#2 test_b\nok\n";
        let extracted = BpfExtractor.extract(log);
        assert_eq!(extracted, DefaultExtractor.extract(log));
    }

    #[test]
    fn selects_bpf_extractor_by_project_name() {
        assert!(extractor_for_project("bpf-next").extract("#1 t\nFAIL\n").contains("FAIL"));
    }
}
