use colored::Colorize;
use crate::llm::memory::ChatSession;
use crate::llm::semantic_search::{source_preview, SourceNode};
use crate::providers::traits::Role;

pub fn print_help() {
    println!("\n⚖️  Indian Tax Advisor");
    println!("  Just type your question, for example:");
    println!("    - How is HRA exemption calculated?");
    println!("    - What is the 80C deduction limit?");
    println!("    - Can I claim home loan interest under Section 24?");
    println!();

    println!("⚙️ Commands:");
    println!("  sources  - Toggle showing cited sources");
    println!("  stream   - Toggle streaming answers");
    println!("  reset    - Clear the conversation");
    println!("  history  - Print the conversation so far");
    println!("  stats    - Show the knowledge base and provider in use");
    println!("  help     - Show this help menu");
    println!("  exit     - Exit the program");
    println!();
}

pub fn print_greeting(session: &ChatSession) {
    if let Some(first) = session.entries().first() {
        println!("{}", first.content.truecolor(255, 236, 179));
    }
}

pub fn print_history(session: &ChatSession) {
    println!();
    for entry in session.entries() {
        let who = match entry.role {
            Role::User => "You".cyan().bold(),
            Role::Assistant => "Advisor".green().bold(),
            Role::System => "System".dimmed(),
        };
        println!("[{}] {}: {}", entry.timestamp.format("%H:%M:%S"), who, entry.content);
    }
    println!();
}

pub fn print_sources(nodes: &[SourceNode]) {
    if nodes.is_empty() {
        println!("{}", "No sources were retrieved for this answer.".dimmed());
        return;
    }

    println!("\n📚 {}", "View Sources".bold());
    for node in nodes {
        println!("  {} {} {}", "Source:".bold(), node.label(), format!("(score {:.2})", node.score).dimmed());
        println!("    {}", source_preview(node).dimmed());
    }
    println!();
}

pub fn print_toggle(name: &str, enabled: bool) {
    let state = if enabled { "on".green() } else { "off".red() };
    println!("{} {}", name, state);
}
