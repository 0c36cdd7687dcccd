use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod calculator;
mod models;
mod report;
mod store;

use calculator::StudentLookup;
use store::CsvStore;

#[derive(Parser)]
#[command(name = "gradebook")]
#[command(about = "Programme gradebook and QCA statistics over flat academic records", long_about = None)]
struct Cli {
    /// Directory holding the flat record files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a realistic sample data set
    Seed,
    /// Show module grades for one student
    Grade {
        #[arg(long)]
        student: String,
        /// Restrict to one module code
        #[arg(long)]
        module: Option<String>,
    },
    /// Show a student's QCA, for one semester or cumulative
    Qca {
        #[arg(long)]
        student: String,
        #[arg(long)]
        semester: Option<u32>,
    },
    /// Programme-level statistics
    Stats {
        #[arg(long)]
        programme: String,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Generate a markdown report for a programme
    Report {
        #[arg(long)]
        programme: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List failing students in a programme
    Failing {
        #[arg(long)]
        programme: String,
    },
    /// Per-student QCAs across a programme, with the cohort average and median
    Cohort {
        #[arg(long)]
        programme: String,
    },
    /// Show a programme's offerings with their grade tables
    Show {
        #[arg(long)]
        programme: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Seed = cli.command {
        CsvStore::seed(&cli.data_dir)?;
        println!("Seed data written to {}.", cli.data_dir.display());
        return Ok(());
    }

    let store = CsvStore::load(&cli.data_dir)
        .with_context(|| format!("loading data directory {}", cli.data_dir.display()))?;

    match cli.command {
        Commands::Seed => unreachable!("handled before the store is loaded"),
        Commands::Grade { student, module } => {
            let record = store.lookup_student(&student)?;
            let mut shown = 0usize;
            for student_module in &record.modules {
                if let Some(code) = &module {
                    if &student_module.module.code != code {
                        continue;
                    }
                }
                let grade = calculator::module_grade(student_module)?;
                let status = if calculator::failed_module(student_module)? {
                    "fail"
                } else {
                    "pass"
                };
                println!(
                    "{} {}: {:.2} ({})",
                    student_module.module.code, student_module.module.name, grade, status
                );
                shown += 1;
            }
            if shown == 0 {
                println!("No graded modules found for student {student}.");
            }
        }
        Commands::Qca { student, semester } => {
            let record = store.lookup_student(&student)?;
            let value = calculator::semester_qca(&record.modules, semester)?;
            match semester {
                Some(n) => println!("QCA for {student} in semester {n}: {value:.2}"),
                None => {
                    println!("Cumulative QCA for {student}: {value:.2}");
                    if calculator::failed_semester(&record.modules, models::DEFAULT_PASS_QCA)? {
                        println!(
                            "Below the pass QCA of {:.1}.",
                            models::DEFAULT_PASS_QCA
                        );
                    }
                }
            }
        }
        Commands::Stats { programme, format } => {
            let programme = store.programme(&programme)?;
            let stats = calculator::programme_statistics(&programme, &store);
            match format {
                Format::Text => print!("{}", report::render_statistics(&stats)),
                Format::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }
        Commands::Report { programme, out } => {
            let programme = store.programme(&programme)?;
            let stats = calculator::programme_statistics(&programme, &store);
            let generated = chrono::Utc::now().date_naive();
            let rendered = report::build_report(&programme, &stats, generated);
            std::fs::write(&out, rendered)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Failing { programme } => {
            let programme = store.programme(&programme)?;
            let failures = calculator::failing_students(&programme, &store);
            print!("{}", report::render_failing(&failures));
        }
        Commands::Cohort { programme } => {
            let programme = store.programme(&programme)?;
            let offerings = programme.all_modules();
            let qcas = calculator::cohort_qcas(&offerings)?;
            if qcas.is_empty() {
                println!("No graded students in programme {}.", programme.code);
            } else {
                for (id, value) in &qcas {
                    println!("- {id}: QCA {value:.2}");
                }
                println!("Average QCA: {:.2}", calculator::average_qca(&offerings)?);
                println!("Median QCA: {:.2}", calculator::median_qca(&offerings)?);
            }
        }
        Commands::Show { programme } => {
            let programme = store.programme(&programme)?;
            print!("{}", report::render_programme_details(&programme));
        }
    }

    Ok(())
}
