use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::{LookupError, StudentLookup};
use crate::models::{Module, Programme, Student, StudentModule, TeacherModule};

#[derive(Debug, Deserialize, Serialize)]
struct StudentRow {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ProgrammeRow {
    code: String,
    name: String,
    catalog_year: String,
    /// Semester numbers the programme spans, `;`-separated.
    semesters: String,
    pass_qca: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ModuleRow {
    programme: String,
    code: String,
    name: String,
    year: i32,
    semester: u32,
    credits: f64,
    grading_scheme: String,
    pass_mark: Option<f64>,
    /// Test weights, `;`-separated.
    weights: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct GradeRow {
    student_id: String,
    /// Test scores, `;`-separated; an empty cell is an ungraded test.
    scores: String,
}

/// Immutable in-memory snapshot of a flat-file data directory:
/// `students.csv`, `programmes.csv`, `modules.csv`, and one
/// `<CODE>_<year>_<semester>.csv` grade table per offering.
///
/// Score cells stay raw until a record is assembled, so one bad cell
/// surfaces against the student or programme it belongs to instead of
/// poisoning the whole load.
pub struct CsvStore {
    students: BTreeMap<String, String>,
    programmes: Vec<ProgrammeRow>,
    modules: Vec<(String, Module)>,
    grade_tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl CsvStore {
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let mut students = BTreeMap::new();
        let mut reader = csv::Reader::from_path(data_dir.join("students.csv"))
            .with_context(|| format!("reading students.csv in {}", data_dir.display()))?;
        for row in reader.deserialize::<StudentRow>() {
            let row = row.context("malformed row in students.csv")?;
            students.insert(row.id, row.name);
        }

        let mut programmes = Vec::new();
        let mut reader = csv::Reader::from_path(data_dir.join("programmes.csv"))
            .with_context(|| format!("reading programmes.csv in {}", data_dir.display()))?;
        for row in reader.deserialize::<ProgrammeRow>() {
            programmes.push(row.context("malformed row in programmes.csv")?);
        }

        let mut modules = Vec::new();
        let mut grade_tables = BTreeMap::new();
        let mut reader = csv::Reader::from_path(data_dir.join("modules.csv"))
            .with_context(|| format!("reading modules.csv in {}", data_dir.display()))?;
        for row in reader.deserialize::<ModuleRow>() {
            let row = row.context("malformed row in modules.csv")?;
            let weights = parse_weights(&row.weights)
                .with_context(|| format!("malformed weights for module {}", row.code))?;
            let module = Module {
                code: row.code,
                name: row.name,
                year: row.year,
                semester: row.semester,
                credits: row.credits,
                grading_scheme: row.grading_scheme,
                weights,
                pass_mark: row.pass_mark,
            };

            let table_path = grade_file(data_dir, &module);
            if table_path.exists() {
                let mut table = BTreeMap::new();
                let mut reader = csv::Reader::from_path(&table_path)
                    .with_context(|| format!("reading {}", table_path.display()))?;
                for row in reader.deserialize::<GradeRow>() {
                    let row = row
                        .with_context(|| format!("malformed row in {}", table_path.display()))?;
                    table.insert(row.student_id, row.scores);
                }
                grade_tables.insert(module.file_key(), table);
            } else {
                debug!(module = %module.file_key(), "no grade table, offering has no enrolments");
            }

            modules.push((row.programme, module));
        }

        debug!(
            students = students.len(),
            programmes = programmes.len(),
            modules = modules.len(),
            "loaded data directory"
        );

        Ok(Self {
            students,
            programmes,
            modules,
            grade_tables,
        })
    }

    /// Assemble a programme with every offering's grade table resolved.
    pub fn programme(&self, code: &str) -> anyhow::Result<Programme> {
        let row = self
            .programmes
            .iter()
            .find(|p| p.code == code)
            .with_context(|| format!("programme {code} not found in programmes.csv"))?;

        let mut semesters: BTreeMap<u32, Vec<TeacherModule>> = BTreeMap::new();
        for part in row.semesters.split(';').filter(|p| !p.is_empty()) {
            let semester: u32 = part
                .parse()
                .with_context(|| format!("malformed semester list for programme {code}"))?;
            semesters.entry(semester).or_default();
        }

        for (programme_code, module) in &self.modules {
            if programme_code != code {
                continue;
            }
            let mut grades = BTreeMap::new();
            if let Some(table) = self.grade_tables.get(&module.file_key()) {
                for (student_id, raw) in table {
                    let scores = parse_scores(raw, module.number_of_tests()).with_context(
                        || {
                            format!(
                                "malformed scores for student {student_id} in {}",
                                module.file_key()
                            )
                        },
                    )?;
                    grades.insert(student_id.clone(), scores);
                }
            }
            semesters
                .entry(module.semester)
                .or_default()
                .push(TeacherModule {
                    module: module.clone(),
                    grades,
                });
        }

        Ok(Programme {
            code: row.code.clone(),
            name: row.name.clone(),
            catalog_year: row.catalog_year.clone(),
            semesters,
            pass_qca: row.pass_qca,
        })
    }

    /// Write a small realistic data set into `data_dir`.
    pub fn seed(data_dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;

        let students = vec![
            StudentRow {
                id: "20027771".to_string(),
                name: "Tomas Walsh".to_string(),
            },
            StudentRow {
                id: "20031337".to_string(),
                name: "Roisin Byrne".to_string(),
            },
            StudentRow {
                id: "20044412".to_string(),
                name: "Aoife Kelly".to_string(),
            },
            StudentRow {
                id: "20050923".to_string(),
                name: "Sean O'Neill".to_string(),
            },
        ];
        write_rows(&data_dir.join("students.csv"), &students)?;

        let programmes = vec![ProgrammeRow {
            code: "LM051".to_string(),
            name: "Computer Systems".to_string(),
            catalog_year: "2026".to_string(),
            semesters: "1;2".to_string(),
            pass_qca: None,
        }];
        write_rows(&data_dir.join("programmes.csv"), &programmes)?;

        let modules = vec![
            ModuleRow {
                programme: "LM051".to_string(),
                code: "CS4004".to_string(),
                name: "Software Testing".to_string(),
                year: 2026,
                semester: 1,
                credits: 6.0,
                grading_scheme: "weighted-sum".to_string(),
                pass_mark: None,
                weights: "0.4;0.6".to_string(),
            },
            ModuleRow {
                programme: "LM051".to_string(),
                code: "CS4023".to_string(),
                name: "Operating Systems".to_string(),
                year: 2026,
                semester: 1,
                credits: 6.0,
                grading_scheme: "weighted-sum".to_string(),
                pass_mark: None,
                weights: "0.5;0.5".to_string(),
            },
            ModuleRow {
                programme: "LM051".to_string(),
                code: "MA4413".to_string(),
                name: "Statistical Methods".to_string(),
                year: 2026,
                semester: 2,
                credits: 9.0,
                grading_scheme: "weighted-sum".to_string(),
                pass_mark: None,
                weights: "0.3;0.3;0.4".to_string(),
            },
        ];
        write_rows(&data_dir.join("modules.csv"), &modules)?;

        write_rows(
            &data_dir.join("CS4004_2026_1.csv"),
            &[
                grade_row("20027771", "72;81"),
                grade_row("20031337", "30;25"),
                grade_row("20044412", "55;61"),
                grade_row("20050923", "52;61"),
            ],
        )?;
        write_rows(
            &data_dir.join("CS4023_2026_1.csv"),
            &[
                grade_row("20027771", "65;70"),
                grade_row("20031337", "35;28"),
                grade_row("20044412", "50;45"),
            ],
        )?;
        write_rows(
            &data_dir.join("MA4413_2026_2.csv"),
            &[
                grade_row("20027771", "55;60;58"),
                grade_row("20031337", "20;30;25"),
                grade_row("20050923", "58;;62"),
            ],
        )?;

        Ok(())
    }
}

impl StudentLookup for CsvStore {
    /// Join the student row with every grade table mentioning the id to
    /// build the full graded history.
    fn lookup_student(&self, id: &str) -> Result<Student, LookupError> {
        let name = self.students.get(id).ok_or_else(|| LookupError::NotFound {
            id: id.to_string(),
        })?;

        let mut modules = Vec::new();
        for (_, module) in &self.modules {
            let Some(raw) = self
                .grade_tables
                .get(&module.file_key())
                .and_then(|table| table.get(id))
            else {
                continue;
            };
            let scores = parse_scores(raw, module.number_of_tests()).map_err(|err| {
                LookupError::Malformed {
                    id: id.to_string(),
                    detail: format!("{}: {err}", module.file_key()),
                }
            })?;
            modules.push(StudentModule {
                module: module.clone(),
                scores,
            });
        }

        Ok(Student {
            id: id.to_string(),
            name: name.clone(),
            modules,
        })
    }
}

fn grade_file(data_dir: &Path, module: &Module) -> PathBuf {
    data_dir.join(format!("{}.csv", module.file_key()))
}

fn grade_row(student_id: &str, scores: &str) -> GradeRow {
    GradeRow {
        student_id: student_id.to_string(),
        scores: scores.to_string(),
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("writing {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a `;`-separated weight field. An empty field is a module with no
/// tests.
fn parse_weights(field: &str) -> Result<Vec<f64>, std::num::ParseFloatError> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field.split(';').map(str::parse).collect()
}

/// Parse a `;`-separated score field. An empty cell is an ungraded test; a
/// fully empty field means no test has been graded yet, so it expands to
/// `expected` ungraded slots.
fn parse_scores(
    field: &str,
    expected: usize,
) -> Result<Vec<Option<f64>>, std::num::ParseFloatError> {
    if field.is_empty() {
        return Ok(vec![None; expected]);
    }
    field
        .split(';')
        .map(|cell| {
            if cell.is_empty() {
                Ok(None)
            } else {
                cell.parse().map(Some)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator;

    fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gradebook_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parses_weight_fields() {
        assert_eq!(parse_weights("0.4;0.6").unwrap(), vec![0.4, 0.6]);
        assert_eq!(parse_weights("").unwrap(), Vec::<f64>::new());
        assert!(parse_weights("0.4;x").is_err());
    }

    #[test]
    fn parses_score_fields_with_ungraded_cells() {
        assert_eq!(
            parse_scores("58;;62", 3).unwrap(),
            vec![Some(58.0), None, Some(62.0)]
        );
        assert_eq!(parse_scores("", 2).unwrap(), vec![None, None]);
        assert_eq!(parse_scores("", 0).unwrap(), Vec::<Option<f64>>::new());
        assert!(parse_scores("58;x", 2).is_err());
    }

    #[test]
    fn seed_round_trips_through_load() {
        let dir = temp_data_dir("seed_round_trip");
        CsvStore::seed(&dir).unwrap();
        let store = CsvStore::load(&dir).unwrap();

        let programme = store.programme("LM051").unwrap();
        assert_eq!(programme.semesters.len(), 2);
        assert_eq!(programme.all_modules().len(), 3);

        let student = store.lookup_student("20050923").unwrap();
        assert_eq!(student.name, "Sean O'Neill");
        assert_eq!(student.modules.len(), 2);
        let statistics_module = student
            .modules
            .iter()
            .find(|sm| sm.module.code == "MA4413")
            .unwrap();
        assert_eq!(statistics_module.scores, vec![Some(58.0), None, Some(62.0)]);
    }

    #[test]
    fn seeded_programme_has_one_failing_student() {
        let dir = temp_data_dir("seed_failing");
        CsvStore::seed(&dir).unwrap();
        let store = CsvStore::load(&dir).unwrap();
        let programme = store.programme("LM051").unwrap();

        let stats = calculator::programme_statistics(&programme, &store);
        assert_eq!(stats.student_count, 4);
        assert_eq!(stats.failing.len(), 1);
        assert_eq!(stats.failing[0].id, "20031337");
        assert!(stats.excluded.is_empty());
    }

    #[test]
    fn unknown_student_is_not_found() {
        let dir = temp_data_dir("lookup_not_found");
        CsvStore::seed(&dir).unwrap();
        let store = CsvStore::load(&dir).unwrap();

        assert_eq!(
            store.lookup_student("99999999"),
            Err(LookupError::NotFound {
                id: "99999999".to_string()
            })
        );
    }

    #[test]
    fn bad_score_cell_reports_malformed_lookup() {
        let dir = temp_data_dir("lookup_malformed");
        CsvStore::seed(&dir).unwrap();
        fs::write(
            dir.join("CS4004_2026_1.csv"),
            "student_id,scores\n20027771,72;oops\n",
        )
        .unwrap();
        let store = CsvStore::load(&dir).unwrap();

        match store.lookup_student("20027771") {
            Err(LookupError::Malformed { id, detail }) => {
                assert_eq!(id, "20027771");
                assert!(detail.contains("CS4004_2026_1"));
            }
            other => panic!("expected malformed lookup, got {other:?}"),
        }
    }

    #[test]
    fn missing_programme_is_an_error() {
        let dir = temp_data_dir("missing_programme");
        CsvStore::seed(&dir).unwrap();
        let store = CsvStore::load(&dir).unwrap();
        assert!(store.programme("LM999").is_err());
    }

}
