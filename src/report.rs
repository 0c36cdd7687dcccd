use std::fmt::Write;

use chrono::NaiveDate;

use crate::calculator::{CohortFailures, ProgrammeStatistics};
use crate::models::Programme;

/// Plain-text statistics block for the `stats` command. Exclusion counts
/// are stated next to the figures they affected.
pub fn render_statistics(stats: &ProgrammeStatistics) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "The average QCA of programme {} is {:.2}",
        stats.programme, stats.average_qca
    );
    let _ = writeln!(
        output,
        "The median QCA of programme {} is {:.2}",
        stats.programme, stats.median_qca
    );
    let _ = writeln!(
        output,
        "The number of failed module enrolments in programme {} is {}",
        stats.programme, stats.failed_enrolments
    );
    let _ = writeln!(
        output,
        "The number of failing students in programme {} is {}",
        stats.programme,
        stats.failing.len()
    );
    if !stats.excluded.is_empty() {
        let _ = writeln!(
            output,
            "{} student(s) excluded due to missing or malformed records",
            stats.excluded.len()
        );
    }

    output
}

/// Failing-student listing for the `failing` command.
pub fn render_failing(failures: &CohortFailures) -> String {
    let mut output = String::new();

    if failures.failing.is_empty() {
        let _ = writeln!(output, "No failing students in this programme.");
    } else {
        for student in failures.failing.iter() {
            let _ = writeln!(
                output,
                "{} ({}) is failing with a QCA of {:.2}",
                student.id, student.name, student.qca
            );
        }
    }

    if !failures.excluded.is_empty() {
        let _ = writeln!(
            output,
            "{} student(s) excluded due to missing or malformed records",
            failures.excluded.len()
        );
    }

    output
}

/// Programme row, header, and every offering with its grade table, for the
/// `show` command.
pub fn render_programme_details(programme: &Programme) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{}", programme.csv_line());
    let _ = write!(output, "{programme}");
    for teacher_module in programme.all_modules() {
        let _ = writeln!(output, "{}", teacher_module.module);
        for id in teacher_module.student_ids() {
            if let Some(view) = teacher_module.student_module(id) {
                let _ = writeln!(output, "  {}: {}", id, view.scores_csv_field());
            }
        }
    }

    output
}

/// Full markdown report for a programme.
pub fn build_report(
    programme: &Programme,
    stats: &ProgrammeStatistics,
    generated: NaiveDate,
) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Programme Report: {} {} ({})",
        programme.code, programme.name, programme.catalog_year
    );
    let _ = writeln!(output, "Generated on {}", generated);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Statistics");
    let _ = writeln!(output, "- Students enrolled: {}", stats.student_count);
    let _ = writeln!(output, "- Average QCA: {:.2}", stats.average_qca);
    let _ = writeln!(output, "- Median QCA: {:.2}", stats.median_qca);
    let _ = writeln!(
        output,
        "- Failed module enrolments: {}",
        stats.failed_enrolments
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Failing Students");

    if stats.failing.is_empty() {
        let _ = writeln!(output, "No failing students in this programme.");
    } else {
        for student in stats.failing.iter() {
            let _ = writeln!(
                output,
                "- {} ({}) QCA {:.2}",
                student.name, student.id, student.qca
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Excluded Records");

    if stats.excluded.is_empty() {
        let _ = writeln!(output, "No records were excluded from the statistics.");
    } else {
        for exclusion in stats.excluded.iter() {
            let _ = writeln!(output, "- {}: {}", exclusion.id, exclusion.reason);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{ExcludedStudent, FailingStudent};
    use std::collections::BTreeMap;

    fn sample_stats() -> ProgrammeStatistics {
        ProgrammeStatistics {
            programme: "LM051".to_string(),
            student_count: 3,
            average_qca: 44.1666,
            median_qca: 45.0,
            failed_enrolments: 2,
            failing: vec![FailingStudent {
                id: "20031337".to_string(),
                name: "Roisin Byrne".to_string(),
                qca: 31.67,
            }],
            excluded: vec![ExcludedStudent {
                id: "ghost".to_string(),
                reason: "student ghost not found".to_string(),
            }],
        }
    }

    fn sample_programme() -> Programme {
        Programme {
            code: "LM051".to_string(),
            name: "Computer Systems".to_string(),
            catalog_year: "2026".to_string(),
            semesters: BTreeMap::new(),
            pass_qca: None,
        }
    }

    #[test]
    fn statistics_block_states_figures_and_exclusions() {
        let text = render_statistics(&sample_stats());
        assert!(text.contains("The average QCA of programme LM051 is 44.17"));
        assert!(text.contains("The median QCA of programme LM051 is 45.00"));
        assert!(text.contains("failed module enrolments in programme LM051 is 2"));
        assert!(text.contains("failing students in programme LM051 is 1"));
        assert!(text.contains("1 student(s) excluded"));
    }

    #[test]
    fn statistics_block_omits_exclusion_line_when_clean() {
        let mut stats = sample_stats();
        stats.excluded.clear();
        assert!(!render_statistics(&stats).contains("excluded"));
    }

    #[test]
    fn failing_listing_names_each_student_once() {
        let failures = CohortFailures {
            failing: sample_stats().failing,
            excluded: Vec::new(),
        };
        let text = render_failing(&failures);
        assert_eq!(text.matches("20031337").count(), 1);
        assert!(text.contains("is failing with a QCA of 31.67"));
    }

    #[test]
    fn failing_listing_has_empty_state() {
        let text = render_failing(&CohortFailures::default());
        assert!(text.contains("No failing students"));
    }

    #[test]
    fn programme_details_list_offerings_and_grades() {
        let mut grades = BTreeMap::new();
        grades.insert("20027771".to_string(), vec![Some(72.0), Some(81.0)]);
        grades.insert("20050923".to_string(), vec![Some(58.0), None]);
        let offering = crate::models::TeacherModule {
            module: crate::models::Module {
                code: "CS4004".to_string(),
                name: "Software Testing".to_string(),
                year: 2026,
                semester: 1,
                credits: 6.0,
                grading_scheme: "weighted-sum".to_string(),
                weights: vec![0.4, 0.6],
                pass_mark: None,
            },
            grades,
        };
        let mut programme = sample_programme();
        programme.semesters.insert(1, vec![offering]);

        let details = render_programme_details(&programme);
        assert!(details.starts_with("LM051,Computer Systems,2026,1\n"));
        assert!(details.contains("LM051 Computer Systems (2026)"));
        assert!(details.contains("CS4004 Software Testing"));
        assert!(details.contains("20027771: 72;81"));
        assert!(details.contains("20050923: 58;"));
    }

    #[test]
    fn report_carries_all_sections() {
        let generated = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let report = build_report(&sample_programme(), &sample_stats(), generated);

        assert!(report.contains("# Programme Report: LM051 Computer Systems (2026)"));
        assert!(report.contains("Generated on 2026-08-05"));
        assert!(report.contains("## Statistics"));
        assert!(report.contains("- Students enrolled: 3"));
        assert!(report.contains("## Failing Students"));
        assert!(report.contains("- Roisin Byrne (20031337) QCA 31.67"));
        assert!(report.contains("## Excluded Records"));
        assert!(report.contains("- ghost: student ghost not found"));
    }
}
