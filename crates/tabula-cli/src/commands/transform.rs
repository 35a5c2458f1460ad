//! Transform command - run the full workflow on one file column.

use std::path::{Path, PathBuf};

use colored::Colorize;
use tabula::session::{Session, Workflow};
use tabula::{Example, TabulaConfig};

/// Arguments of the transform command.
pub struct Options {
    pub file: PathBuf,
    pub column: String,
    pub examples: Vec<String>,
    pub llm: Option<String>,
    pub model: Option<String>,
    pub show_code: bool,
    pub commit: bool,
    pub output: Option<PathBuf>,
}

/// Audit rows shown per column before eliding.
const AUDIT_LINES: usize = 10;

pub async fn run(mut config: TabulaConfig, options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let file = &options.file;
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }
    if let Some(provider) = options.llm {
        config.llm.provider = provider;
    }
    if options.model.is_some() {
        config.llm.model = options.model;
    }

    let examples = options
        .examples
        .iter()
        .map(|e| Example::parse(e))
        .collect::<Result<Vec<_>, _>>()?;

    let workflow = Workflow::from_config(&config)?;
    let mut session = Session::new("cli");

    let name = file_name(file);
    let contents = std::fs::read(file)?;
    workflow.connect_file(&mut session, &name, &contents).await?;

    println!(
        "{} {} ({} rows in preview)",
        "Loaded".cyan().bold(),
        name.white(),
        session.working_rows().len()
    );

    workflow.select_column(&mut session, &options.column)?;
    workflow.set_examples(&mut session, examples)?;

    let classification = workflow.classify(&mut session).await?;
    println!(
        "{} {} via {}",
        "Classified".cyan().bold(),
        classification.to_string().yellow(),
        workflow.synthesizer().name()
    );

    let code = workflow.generate(&mut session).await?;
    if options.show_code {
        println!();
        println!("{}", "Generated code:".yellow().bold());
        for line in code.lines() {
            println!("  {}", line.dimmed());
        }
    }

    let applied = workflow.apply_preview(&mut session)?;
    println!();
    println!(
        "{} {} rows changed in the preview",
        "Applied".cyan().bold(),
        applied.result.rows_modified.to_string().white().bold()
    );
    for change in applied.result.changes.iter().filter(|c| c.values_changed > 0) {
        println!("  {} ({} values)", change.column.yellow(), change.values_changed);
        for audit in change.row_audits.iter().take(AUDIT_LINES) {
            println!(
                "    row {:>4}  {} {} {}",
                audit.row,
                audit.original_value.red(),
                "->".dimmed(),
                audit.new_value.green()
            );
        }
        if change.row_audits.len() > AUDIT_LINES {
            println!(
                "    {}",
                format!("... {} more", change.row_audits.len() - AUDIT_LINES).dimmed()
            );
        }
    }

    if !options.commit {
        println!();
        println!("{}", "Preview only; pass --commit to write the file.".dimmed());
        return Ok(());
    }

    let outcome = workflow.commit(&mut session).await?;
    if outcome.is_partial() {
        println!(
            "{} {} rows written, {} failed",
            "Partial commit:".yellow().bold(),
            outcome.affected_row_count,
            outcome.failures.len()
        );
        for failure in outcome.failures.iter().take(AUDIT_LINES) {
            println!("    {} {}", failure.key.red(), failure.cause.dimmed());
        }
    } else {
        println!(
            "{} {} rows",
            "Committed".green().bold(),
            outcome.affected_row_count
        );
    }

    let artifact = workflow.download(&session)?;
    let output = options.output.unwrap_or_else(|| default_output(file));
    std::fs::write(&output, &artifact.bytes)?;
    println!("{} {}", "Wrote".green().bold(), output.display());

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// `data.csv` becomes `data.transformed.csv` next to the input.
fn default_output(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.transformed.{}", stem, ext.to_string_lossy()),
        None => format!("{}.transformed", stem),
    };
    path.with_file_name(name)
}
