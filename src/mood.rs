//! Reduction of a mood history into a dominant label and a coarse category.

use std::collections::HashMap;

use serde::Serialize;

use crate::constants::{CALM_INDICATORS, NO_DATA_MESSAGE, STRESS_INDICATORS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodCategory {
    HighStress,
    Stable,
    Other,
}

impl MoodCategory {
    pub fn of(label: &str) -> Self {
        if STRESS_INDICATORS.contains(&label) {
            Self::HighStress
        } else if CALM_INDICATORS.contains(&label) {
            Self::Stable
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoodSummary {
    pub dominant: String,
    pub count: usize,
    pub total: usize,
    pub category: MoodCategory,
}

impl MoodSummary {
    pub fn message(&self) -> String {
        match self.category {
            MoodCategory::HighStress => {
                format!("High stress detected! Your common mood: {}", self.dominant)
            }
            MoodCategory::Stable => {
                format!("Stable mood detected! Your common mood: {}", self.dominant)
            }
            MoodCategory::Other => format!("Mood analysis: {}", self.dominant),
        }
    }
}

/// Most frequent label with its count. Ties go to the label seen first.
pub fn most_frequent<S: AsRef<str>>(history: &[S]) -> Option<(&str, usize)> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, label) in history.iter().enumerate() {
        let entry = counts.entry(label.as_ref()).or_insert((0, idx));
        entry.0 += 1;
    }

    counts
        .into_iter()
        .min_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        })
        .map(|(label, (count, _))| (label, count))
}

pub fn analyze<S: AsRef<str>>(history: &[S]) -> Option<MoodSummary> {
    let (dominant, count) = most_frequent(history)?;
    Some(MoodSummary {
        dominant: dominant.to_string(),
        count,
        total: history.len(),
        category: MoodCategory::of(dominant),
    })
}

pub fn summarize<S: AsRef<str>>(history: &[S]) -> String {
    match analyze(history) {
        Some(summary) => summary.message(),
        None => NO_DATA_MESSAGE.to_string(),
    }
}
