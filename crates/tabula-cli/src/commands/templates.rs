//! Templates command - list the built-in algorithmic templates.

use colored::Colorize;
use tabula::synthesis::templates::TEMPLATES;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("{} ({})", "Built-in templates".cyan().bold(), TEMPLATES.len());
    println!();
    for template in TEMPLATES {
        let (input, output) = template.example;
        println!("  {} {}", format!("{:28}", template.name).white().bold(), template.description);
        println!("  {:28} {}", "", format!("{} -> {}", input, output).dimmed());
    }
    Ok(())
}
