//! Counters for the modifications applied during a run.

use std::fmt::Write as _;

/// Per-run accumulator of applied optimizations.
///
/// Owned by the engine and passed down by mutable reference; per-file
/// counters are cleared between files while run totals keep accumulating.
#[derive(Debug, Clone, Default)]
pub struct OptimizeStats {
    pub add_cache: usize,
    pub insert_before: usize,
    pub remove_command: usize,
    pub remove_option: usize,
    pub syntax_change: usize,

    pub total_add_cache: usize,
    pub total_insert_before: usize,
    pub total_remove_command: usize,
    pub total_remove_option: usize,
    pub total_syntax_change: usize,
}

impl OptimizeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cache(&mut self) {
        self.add_cache += 1;
        self.total_add_cache += 1;
    }

    pub fn insert_before(&mut self) {
        self.insert_before += 1;
        self.total_insert_before += 1;
    }

    pub fn remove_command(&mut self) {
        self.remove_command += 1;
        self.total_remove_command += 1;
    }

    pub fn remove_option(&mut self) {
        self.remove_option += 1;
        self.total_remove_option += 1;
    }

    pub fn syntax_change(&mut self) {
        self.syntax_change += 1;
        self.total_syntax_change += 1;
    }

    /// Number of modifications applied to the current file.
    pub fn file_total(&self) -> usize {
        self.add_cache + self.insert_before + self.remove_command + self.remove_option + self.syntax_change
    }

    /// Drops the per-file counters, rolling back nothing from the totals.
    pub fn clear_file(&mut self) {
        self.add_cache = 0;
        self.insert_before = 0;
        self.remove_command = 0;
        self.remove_option = 0;
        self.syntax_change = 0;
    }

    /// Rolls the current file's counters back out of the run totals, for a
    /// file whose optimization was abandoned.
    pub fn discard_file(&mut self) {
        self.total_add_cache -= self.add_cache;
        self.total_insert_before -= self.insert_before;
        self.total_remove_command -= self.remove_command;
        self.total_remove_option -= self.remove_option;
        self.total_syntax_change -= self.syntax_change;
        self.clear_file();
    }

    pub fn file_report(&self) -> String {
        Self::report(
            "Number of modifications of this Dockerfile",
            self.file_total(),
            self.add_cache,
            self.insert_before,
            self.remove_command,
            self.remove_option,
            self.syntax_change,
        )
    }

    pub fn total_report(&self) -> String {
        Self::report(
            "Total number of modifications",
            self.total_add_cache
                + self.total_insert_before
                + self.total_remove_command
                + self.total_remove_option
                + self.total_syntax_change,
            self.total_add_cache,
            self.total_insert_before,
            self.total_remove_command,
            self.total_remove_option,
            self.total_syntax_change,
        )
    }

    fn report(
        heading: &str,
        total: usize,
        add_cache: usize,
        insert_before: usize,
        remove_command: usize,
        remove_option: usize,
        syntax_change: usize,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", heading, total);
        let _ = writeln!(out, " - Added --mount=type=cache: {}", add_cache);
        let _ = writeln!(out, " - Inserted commands: {}", insert_before);
        let _ = writeln!(out, " - Removed commands: {}", remove_command);
        let _ = writeln!(out, " - Removed options: {}", remove_option);
        let _ = writeln!(out, " - Added/Modified syntax directives: {}", syntax_change);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_file_and_totals() {
        let mut stats = OptimizeStats::new();
        stats.add_cache();
        stats.add_cache();
        stats.insert_before();
        assert_eq!(stats.file_total(), 3);

        stats.clear_file();
        assert_eq!(stats.file_total(), 0);
        assert_eq!(stats.total_add_cache, 2);
        assert_eq!(stats.total_insert_before, 1);
    }

    #[test]
    fn test_discard_file_rolls_back_totals() {
        let mut stats = OptimizeStats::new();
        stats.add_cache();
        stats.clear_file();

        stats.remove_command();
        stats.discard_file();
        assert_eq!(stats.total_remove_command, 0);
        assert_eq!(stats.total_add_cache, 1);
    }

    #[test]
    fn test_report_mentions_every_counter() {
        let mut stats = OptimizeStats::new();
        stats.syntax_change();
        let report = stats.file_report();
        assert!(report.contains("syntax directives: 1"));
        assert!(report.contains("--mount=type=cache: 0"));
    }
}
