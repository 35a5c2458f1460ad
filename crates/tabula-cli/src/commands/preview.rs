//! Preview command - show the shape of a data file.

use std::path::PathBuf;

use colored::Colorize;
use tabula::input::Parser;
use tabula::source::FileSource;

pub fn run(file: PathBuf, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let contents = std::fs::read(&file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    let source = FileSource::connect(&name, &contents, &Parser::new())?;
    let metadata = source.metadata();
    let preview = source.fetch_preview(limit);

    println!(
        "{} {} ({}, {} rows, {} columns)",
        "Preview".cyan().bold(),
        metadata.file.white(),
        metadata.format.name(),
        metadata.row_count,
        metadata.column_count
    );
    println!();
    println!("{}", preview.columns.join(" | ").yellow().bold());
    for row in &preview.rows {
        let cells: Vec<String> = preview
            .columns
            .iter()
            .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        println!("{}", cells.join(" | "));
    }
    if metadata.row_count > preview.rows.len() {
        println!(
            "{}",
            format!("... {} more rows", metadata.row_count - preview.rows.len()).dimmed()
        );
    }

    Ok(())
}
