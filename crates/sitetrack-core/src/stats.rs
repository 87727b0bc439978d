use chrono::NaiveDate;

use crate::task::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
}

impl Stats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let overdue = tasks.iter().filter(|t| t.is_overdue(today)).count();
        Self {
            total,
            completed,
            pending: total - completed,
            overdue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaProgress {
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub percent: u8,
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Completion of tasks whose area contains `needle`, ignoring case.
pub fn progress(tasks: &[Task], needle: &str) -> AreaProgress {
    let needle_upper = needle.to_uppercase();
    let matching: Vec<&Task> = tasks
        .iter()
        .filter(|t| !t.area.is_empty() && t.area.to_uppercase().contains(&needle_upper))
        .collect();
    let completed = matching.iter().filter(|t| t.completed).count();

    AreaProgress {
        label: needle.to_string(),
        total: matching.len(),
        completed,
        percent: percent(completed, matching.len()),
    }
}

pub fn overall_progress(tasks: &[Task]) -> AreaProgress {
    let completed = tasks.iter().filter(|t| t.completed).count();
    AreaProgress {
        label: "Overall".to_string(),
        total: tasks.len(),
        completed,
        percent: percent(completed, tasks.len()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::sample_tasks;

    #[test]
    fn counters_follow_completion_and_deadlines() {
        let mut tasks = sample_tasks();
        tasks[0].completed = true;
        let today = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();

        assert_eq!(
            Stats::compute(&tasks, today),
            Stats {
                total: 6,
                completed: 1,
                pending: 5,
                overdue: 2,
            }
        );
        assert_eq!(Stats::compute(&[], today), Stats::default());
    }

    #[test]
    fn area_progress_matches_substrings_case_insensitively() {
        let mut tasks = sample_tasks();
        tasks[2].completed = true;

        let temple = progress(&tasks, "temple");
        assert_eq!((temple.total, temple.completed, temple.percent), (2, 1, 50));

        let prasadam = progress(&tasks, "PRASADAM");
        assert_eq!(prasadam.percent, 0);

        assert_eq!(progress(&tasks, "nowhere").percent, 0);
        assert_eq!(overall_progress(&tasks).percent, 17);
    }
}
