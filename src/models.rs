use std::collections::BTreeMap;
use std::fmt;

/// Default numeric pass mark for a module on the 0-100 scale, used when the
/// module row does not configure its own cutoff.
pub const DEFAULT_PASS_MARK: f64 = 40.0;

/// Default programme pass QCA on the 0-100 scale.
pub const DEFAULT_PASS_QCA: f64 = 40.0;

/// A module offering: identity, offering period, credit weight, and the
/// ordered test weights that define its grading scheme.
///
/// The weights are proportional shares taken exactly as given; they are not
/// re-normalized to sum to 1. The number of weights fixes the expected
/// number of test scores for every enrolment in this offering.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub code: String,
    pub name: String,
    pub year: i32,
    pub semester: u32,
    pub credits: f64,
    pub grading_scheme: String,
    pub weights: Vec<f64>,
    /// Pass cutoff for this module; `None` falls back to [`DEFAULT_PASS_MARK`].
    pub pass_mark: Option<f64>,
}

impl Module {
    /// Number of tests an enrolment in this module is expected to carry.
    pub fn number_of_tests(&self) -> usize {
        self.weights.len()
    }

    /// Stem of the flat grade file for this offering, e.g. `CS4004_2026_1`.
    pub fn file_key(&self) -> String {
        format!("{}_{}_{}", self.code, self.year, self.semester)
    }

    pub fn effective_pass_mark(&self) -> f64 {
        self.pass_mark.unwrap_or(DEFAULT_PASS_MARK)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} semester {}, {} credits, {} scheme, test weights {})",
            self.code,
            self.name,
            self.year,
            self.semester,
            self.credits,
            self.grading_scheme,
            join_weights(&self.weights)
        )
    }
}

/// One student's view of a module: the module plus that student's ordered
/// test scores. `None` is an ungraded test - present in shape, absent in
/// value - which is not the same thing as an entered 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentModule {
    pub module: Module,
    pub scores: Vec<Option<f64>>,
}

impl StudentModule {
    /// Scores rendered as the single `;`-separated field used by the
    /// per-offering grade files. An ungraded slot renders as an empty cell.
    pub fn scores_csv_field(&self) -> String {
        join_scores(&self.scores)
    }
}

impl fmt::Display for StudentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with scores {}", self.module, join_scores(&self.scores))
    }
}

/// The teacher's-eye view of one offering: the module plus every enrolled
/// student's score vector, keyed by student id. A `BTreeMap` keeps
/// enumeration and file output deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct TeacherModule {
    pub module: Module,
    pub grades: BTreeMap<String, Vec<Option<f64>>>,
}

impl TeacherModule {
    pub fn student_ids(&self) -> impl Iterator<Item = &str> {
        self.grades.keys().map(String::as_str)
    }

    /// Derive the per-student view for one enrolled student.
    pub fn student_module(&self, student_id: &str) -> Option<StudentModule> {
        self.grades.get(student_id).map(|scores| StudentModule {
            module: self.module.clone(),
            scores: scores.clone(),
        })
    }
}

/// A student and their full graded module history across semesters.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub modules: Vec<StudentModule>,
}

/// A programme: identity plus the offerings of each semester of its catalog
/// year. Student data is reached only through each offering's enrolment
/// keys, never owned here.
#[derive(Debug, Clone, PartialEq)]
pub struct Programme {
    pub code: String,
    pub name: String,
    pub catalog_year: String,
    pub semesters: BTreeMap<u32, Vec<TeacherModule>>,
    /// Pass QCA for this programme; `None` falls back to [`DEFAULT_PASS_QCA`].
    pub pass_qca: Option<f64>,
}

impl Programme {
    /// Every offering across all semesters, in semester order.
    pub fn all_modules(&self) -> Vec<&TeacherModule> {
        self.semesters.values().flatten().collect()
    }

    pub fn effective_pass_qca(&self) -> f64 {
        self.pass_qca.unwrap_or(DEFAULT_PASS_QCA)
    }

    /// The programme's row in `programmes.csv`: code, name, catalog year,
    /// and the semester numbers it spans.
    pub fn csv_line(&self) -> String {
        let semesters: Vec<String> = self.semesters.keys().map(u32::to_string).collect();
        format!(
            "{},{},{},{}",
            self.code,
            self.name,
            self.catalog_year,
            semesters.join(";")
        )
    }
}

impl fmt::Display for Programme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({})", self.code, self.name, self.catalog_year)?;
        for (semester, offerings) in &self.semesters {
            let codes: Vec<&str> = offerings.iter().map(|tm| tm.module.code.as_str()).collect();
            writeln!(f, "Semester {}: {}", semester, codes.join(", "))?;
        }
        Ok(())
    }
}

fn join_weights(weights: &[f64]) -> String {
    let parts: Vec<String> = weights.iter().map(f64::to_string).collect();
    parts.join(";")
}

fn join_scores(scores: &[Option<f64>]) -> String {
    let parts: Vec<String> = scores
        .iter()
        .map(|s| s.map(|v| v.to_string()).unwrap_or_default())
        .collect();
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module() -> Module {
        Module {
            code: "CS4004".to_string(),
            name: "Software Testing".to_string(),
            year: 2026,
            semester: 1,
            credits: 6.0,
            grading_scheme: "weighted-sum".to_string(),
            weights: vec![0.4, 0.6],
            pass_mark: None,
        }
    }

    #[test]
    fn number_of_tests_follows_weights() {
        assert_eq!(sample_module().number_of_tests(), 2);
    }

    #[test]
    fn file_key_joins_code_year_semester() {
        assert_eq!(sample_module().file_key(), "CS4004_2026_1");
    }

    #[test]
    fn pass_mark_defaults_when_unset() {
        let mut module = sample_module();
        assert_eq!(module.effective_pass_mark(), DEFAULT_PASS_MARK);
        module.pass_mark = Some(50.0);
        assert_eq!(module.effective_pass_mark(), 50.0);
    }

    #[test]
    fn ungraded_slots_render_as_empty_cells() {
        let student_module = StudentModule {
            module: sample_module(),
            scores: vec![Some(72.0), None],
        };
        assert_eq!(student_module.scores_csv_field(), "72;");
    }

    #[test]
    fn teacher_module_derives_student_view() {
        let mut grades = BTreeMap::new();
        grades.insert("20031337".to_string(), vec![Some(55.0), Some(61.0)]);
        let teacher_module = TeacherModule {
            module: sample_module(),
            grades,
        };

        let view = teacher_module.student_module("20031337").unwrap();
        assert_eq!(view.scores, vec![Some(55.0), Some(61.0)]);
        assert_eq!(view.module.code, "CS4004");
        assert!(teacher_module.student_module("unknown").is_none());
    }

    #[test]
    fn programme_csv_line_lists_semesters() {
        let mut semesters = BTreeMap::new();
        semesters.insert(1, Vec::new());
        semesters.insert(2, Vec::new());
        let programme = Programme {
            code: "LM051".to_string(),
            name: "Computer Systems".to_string(),
            catalog_year: "2026".to_string(),
            semesters,
            pass_qca: None,
        };
        assert_eq!(programme.csv_line(), "LM051,Computer Systems,2026,1;2");
    }
}
