use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Programme, Student, StudentModule, TeacherModule};

/// Data-integrity failure inside a grade computation. Fails loudly: a
/// mismatched record is rejected, never truncated or padded into a
/// misleading grade.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GradeError {
    #[error("module {module}: expected {expected} test scores, found {actual}")]
    ShapeMismatch {
        module: String,
        expected: usize,
        actual: usize,
    },
}

/// Failure reported by the student-lookup collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    #[error("student {id} not found")]
    NotFound { id: String },
    #[error("student {id} has malformed records: {detail}")]
    Malformed { id: String, detail: String },
}

/// Resolves an enrolment key to a student with their full graded history.
/// Implemented by the flat-file store; tests substitute in-memory maps.
pub trait StudentLookup {
    fn lookup_student(&self, id: &str) -> Result<Student, LookupError>;
}

/// Weighted-sum grade for one student's module: `sum(weight * score)` over
/// the graded tests. Weights are proportional shares taken as given. An
/// ungraded (`None`) test contributes nothing yet; a module with no tests
/// grades as 0.0.
pub fn module_grade(student_module: &StudentModule) -> Result<f64, GradeError> {
    let expected = student_module.module.number_of_tests();
    if student_module.scores.len() != expected {
        return Err(GradeError::ShapeMismatch {
            module: student_module.module.code.clone(),
            expected,
            actual: student_module.scores.len(),
        });
    }

    Ok(student_module
        .module
        .weights
        .iter()
        .zip(student_module.scores.iter())
        .filter_map(|(weight, score)| score.map(|s| weight * s))
        .sum())
}

/// Credit-weighted average over `(grade, credits)` pairs. An empty
/// population (total credits 0) is 0.0 by convention, not a fault.
pub fn qca(graded: &[(f64, f64)]) -> f64 {
    let total_credits: f64 = graded.iter().map(|(_, credits)| credits).sum();
    if total_credits == 0.0 {
        debug!("QCA over an empty population, defaulting to 0.0");
        return 0.0;
    }

    let weighted: f64 = graded.iter().map(|(grade, credits)| grade * credits).sum();
    weighted / total_credits
}

/// QCA over one student's modules. `Some(n)` restricts the population to
/// semester `n`; `None` takes the full history. The scope is always this
/// explicit parameter, never inferred.
pub fn semester_qca(
    modules: &[StudentModule],
    semester: Option<u32>,
) -> Result<f64, GradeError> {
    let mut graded = Vec::new();
    for student_module in modules {
        if let Some(wanted) = semester {
            if student_module.module.semester != wanted {
                continue;
            }
        }
        graded.push((module_grade(student_module)?, student_module.module.credits));
    }
    Ok(qca(&graded))
}

/// Arithmetic mean. Empty input is 0.0 by convention.
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median: middle element for an odd count, mean of the two middle elements
/// for an even count. Empty input is 0.0 by convention.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Per-student QCA across the supplied offerings, keyed and ordered by
/// student id. Each student's population is their enrolments within this
/// set only; full histories belong to [`failing_students`].
pub fn cohort_qcas(offerings: &[&TeacherModule]) -> Result<Vec<(String, f64)>, GradeError> {
    let mut per_student: BTreeMap<String, Vec<StudentModule>> = BTreeMap::new();
    for teacher_module in offerings {
        for id in teacher_module.student_ids() {
            if let Some(view) = teacher_module.student_module(id) {
                per_student.entry(id.to_string()).or_default().push(view);
            }
        }
    }

    per_student
        .into_iter()
        .map(|(id, modules)| semester_qca(&modules, None).map(|value| (id, value)))
        .collect()
}

/// Mean of the per-student QCAs across the supplied offerings.
pub fn average_qca(offerings: &[&TeacherModule]) -> Result<f64, GradeError> {
    let qcas: Vec<f64> = cohort_qcas(offerings)?.into_iter().map(|(_, q)| q).collect();
    Ok(average(&qcas))
}

/// Median of the per-student QCAs across the supplied offerings.
pub fn median_qca(offerings: &[&TeacherModule]) -> Result<f64, GradeError> {
    let qcas: Vec<f64> = cohort_qcas(offerings)?.into_iter().map(|(_, q)| q).collect();
    Ok(median(&qcas))
}

/// Whether the module grade falls below the module's pass mark.
pub fn failed_module(student_module: &StudentModule) -> Result<bool, GradeError> {
    Ok(module_grade(student_module)? < student_module.module.effective_pass_mark())
}

/// Whether the QCA over the supplied modules falls below `pass_qca`.
///
/// Policy: a semester fails on its QCA alone. A single failed module does
/// not fail the semester; the two classifications stay independently
/// retrievable ([`failed_module`] vs this).
pub fn failed_semester(modules: &[StudentModule], pass_qca: f64) -> Result<bool, GradeError> {
    Ok(semester_qca(modules, None)? < pass_qca)
}

/// A student classified as failing, with the QCA that classified them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailingStudent {
    pub id: String,
    pub name: String,
    pub qca: f64,
}

/// A student excluded from cohort statistics, with the reason. Exclusions
/// are recoverable for diagnostics, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedStudent {
    pub id: String,
    pub reason: String,
}

/// Outcome of scanning a programme's enrolments for failing students.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortFailures {
    pub failing: Vec<FailingStudent>,
    pub excluded: Vec<ExcludedStudent>,
}

/// Scan every enrolment in the programme, resolve each distinct student
/// through the lookup collaborator, and classify their full graded history
/// against the programme's pass QCA.
///
/// Each failing student appears exactly once however many offerings they
/// fail in. A student the directory cannot resolve, or whose records are
/// shape-mismatched, is excluded and recorded; the scan itself never
/// aborts on a collaborator failure.
pub fn failing_students(
    programme: &Programme,
    directory: &impl StudentLookup,
) -> CohortFailures {
    let pass_qca = programme.effective_pass_qca();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut result = CohortFailures::default();

    for teacher_module in programme.all_modules() {
        for id in teacher_module.student_ids() {
            if !seen.insert(id.to_string()) {
                continue;
            }

            let student = match directory.lookup_student(id) {
                Ok(student) => student,
                Err(err) => {
                    warn!(student = id, error = %err, "excluding unresolvable student");
                    result.excluded.push(ExcludedStudent {
                        id: id.to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            match semester_qca(&student.modules, None) {
                Ok(value) if value < pass_qca => result.failing.push(FailingStudent {
                    id: student.id,
                    name: student.name,
                    qca: value,
                }),
                Ok(_) => {}
                Err(err) => {
                    warn!(student = id, error = %err, "excluding student with mismatched records");
                    result.excluded.push(ExcludedStudent {
                        id: id.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    result
}

/// Programme-level aggregate the report layer renders: cohort QCA average
/// and median, failed enrolment count, the deduplicated failing-student
/// list, and every exclusion that affected the figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgrammeStatistics {
    pub programme: String,
    /// Distinct students enrolled in at least one offering.
    pub student_count: usize,
    pub average_qca: f64,
    pub median_qca: f64,
    /// Student-module instances graded below their module's pass mark.
    /// Counts enrolments, not distinct students.
    pub failed_enrolments: usize,
    pub failing: Vec<FailingStudent>,
    pub excluded: Vec<ExcludedStudent>,
}

pub fn programme_statistics(
    programme: &Programme,
    directory: &impl StudentLookup,
) -> ProgrammeStatistics {
    let offerings = programme.all_modules();

    let mut per_student: BTreeMap<String, Vec<StudentModule>> = BTreeMap::new();
    let mut failed_enrolments = 0usize;
    for teacher_module in &offerings {
        for id in teacher_module.student_ids() {
            let Some(view) = teacher_module.student_module(id) else {
                continue;
            };
            if matches!(failed_module(&view), Ok(true)) {
                failed_enrolments += 1;
            }
            per_student.entry(id.to_string()).or_default().push(view);
        }
    }

    let student_count = per_student.len();
    let failures = failing_students(programme, directory);
    let mut excluded = failures.excluded;

    let mut qcas = Vec::new();
    for (id, modules) in per_student {
        if excluded.iter().any(|e| e.id == id) {
            continue;
        }
        match semester_qca(&modules, None) {
            Ok(value) => qcas.push(value),
            Err(err) => {
                warn!(student = %id, error = %err, "excluding student from programme statistics");
                excluded.push(ExcludedStudent {
                    id,
                    reason: err.to_string(),
                });
            }
        }
    }

    ProgrammeStatistics {
        programme: programme.code.clone(),
        student_count,
        average_qca: average(&qcas),
        median_qca: median(&qcas),
        failed_enrolments,
        failing: failures.failing,
        excluded,
    }
}
