use anyhow::anyhow;
use tracing::trace;

use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Completion {
  Completed,
  Pending
}

/// Conjunction of the optional list
/// predicates. An empty filter keeps
/// every task.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskFilter {
  pub search:     Option<String>,
  pub area:       Option<String>,
  pub completion: Option<Completion>,
  pub priority:   Option<Priority>
}

impl TaskFilter {
  /// Parses CLI terms: `area:<x>`,
  /// `priority:<p>`,
  /// `status:completed|pending`;
  /// everything else is search text.
  #[tracing::instrument]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut filter = Self::default();
    let mut words = Vec::new();

    for term in terms {
      if let Some(area) =
        term.strip_prefix("area:")
      {
        filter.area =
          Some(area.to_string());
      } else if let Some(raw) =
        term.strip_prefix("priority:")
      {
        let priority =
          Priority::parse_strict(raw)
            .ok_or_else(|| {
              anyhow!(
                "unknown priority: \
                 {raw}"
              )
            })?;
        filter.priority =
          Some(priority);
      } else if let Some(raw) =
        term.strip_prefix("status:")
      {
        filter.completion = Some(
          parse_completion(raw)?
        );
      } else {
        words.push(term.as_str());
      }
    }

    if !words.is_empty() {
      filter.search =
        Some(words.join(" "));
    }

    trace!(?filter, "parsed filter");
    Ok(filter)
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    if let Some(query) =
      self.search.as_deref()
    {
      let q = query.to_lowercase();
      if !q.is_empty()
        && !task
          .description
          .to_lowercase()
          .contains(&q)
        && !task
          .status
          .to_lowercase()
          .contains(&q)
        && !task
          .area
          .to_lowercase()
          .contains(&q)
      {
        return false;
      }
    }

    if let Some(area) =
      self.area.as_deref()
      && task.area != area
    {
      return false;
    }

    match self.completion {
      | Some(Completion::Completed)
        if !task.completed =>
      {
        return false;
      }
      | Some(Completion::Pending)
        if task.completed =>
      {
        return false;
      }
      | _ => {}
    }

    if let Some(priority) =
      self.priority
      && task.priority != priority
    {
      return false;
    }

    true
  }

  /// Matching tasks in list order.
  pub fn apply(
    &self,
    tasks: &[Task]
  ) -> Vec<Task> {
    tasks
      .iter()
      .filter(|task| self.matches(task))
      .cloned()
      .collect()
  }
}

fn parse_completion(
  raw: &str
) -> anyhow::Result<Completion> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "completed" | "done" => {
      Ok(Completion::Completed)
    }
    | "pending" | "open" => {
      Ok(Completion::Pending)
    }
    | other => Err(anyhow!(
      "unknown status filter: \
       {other} (use completed or \
       pending)"
    ))
  }
}

/// Distinct areas in first-seen order.
pub fn areas(
  tasks: &[Task]
) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for task in tasks {
    if !out.contains(&task.area) {
      out.push(task.area.clone());
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::engine::sample_tasks;

  fn terms(raw: &[&str]) -> Vec<String> {
    raw
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  #[test]
  fn empty_filter_keeps_everything() {
    let tasks = sample_tasks();
    let filter =
      TaskFilter::parse(&[]).unwrap();
    assert!(filter.is_empty());
    assert_eq!(
      filter.apply(&tasks),
      tasks
    );
  }

  #[test]
  fn results_are_a_subset_satisfying_every_predicate()
   {
    let mut tasks = sample_tasks();
    tasks[0].completed = true;
    tasks[1].completed = true;

    let cases = [
      terms(&["ceiling"]),
      terms(&["TEMPLE"]),
      terms(&["area:PRASADAM HALL"]),
      terms(&["status:completed"]),
      terms(&["status:pending", "priority:high"]),
      terms(&["area:TEMPLE AREA", "wiring"]),
      terms(&["planned"]),
    ];

    for case in cases {
      let filter =
        TaskFilter::parse(&case).unwrap();
      let rows = filter.apply(&tasks);
      for row in &rows {
        assert!(tasks.contains(row));
        assert!(filter.matches(row));
      }
      let expected = tasks
        .iter()
        .filter(|t| filter.matches(t))
        .count();
      assert_eq!(rows.len(), expected);
    }
  }

  #[test]
  fn search_covers_description_status_and_area()
   {
    let tasks = sample_tasks();
    let by = |q: &str| {
      TaskFilter::parse(&terms(&[q]))
        .unwrap()
        .apply(&tasks)
        .into_iter()
        .map(|t| t.id)
        .collect::<Vec<_>>()
    };
    assert_eq!(by("tiles"), vec!["ph_2"]);
    assert_eq!(by("all clear"), vec!["st_1"]);
    assert_eq!(by("ashram"), vec!["ab_1"]);
  }

  #[test]
  fn area_filter_is_exact() {
    let tasks = sample_tasks();
    let filter = TaskFilter::parse(
      &terms(&["area:TEMPLE"])
    )
    .unwrap();
    assert!(filter.apply(&tasks).is_empty());
  }

  #[test]
  fn bad_terms_are_errors() {
    assert!(
      TaskFilter::parse(&terms(&[
        "priority:urgent"
      ]))
      .is_err()
    );
    assert!(
      TaskFilter::parse(&terms(&[
        "status:maybe"
      ]))
      .is_err()
    );
  }

  #[test]
  fn areas_keep_first_seen_order() {
    assert_eq!(
      areas(&sample_tasks()),
      vec![
        "PRASADAM HALL",
        "TEMPLE AREA",
        "ASHRAM AREA",
        "STP & TOILET"
      ]
    );
  }
}
