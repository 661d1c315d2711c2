use colored::Colorize;
use contentscout::replace::{generate_file_diff, FileDiff};

/// Prints a colored unified diff of a document's pretty-printed old and new content
pub fn print_unified_diff(path: &str, old_content: &str, new_content: &str) {
    let diff = generate_file_diff(path, old_content, new_content);
    if diff.is_empty() {
        return;
    }
    for line in diff.unified(old_content, new_content).lines() {
        if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}

/// Prints only the changed lines of a diff, old above new
pub fn print_changed_lines(diff: &FileDiff) {
    println!("In file: {}", diff.path.blue());
    for hunk in &diff.hunks {
        println!("Line {}:", hunk.original_start_line);
        for line in &hunk.original_lines {
            println!("  {} {}", "OLD:".red(), line.trim());
        }
        for line in &hunk.new_lines {
            println!("  {} {}", "NEW:".green(), line.trim());
        }
        println!();
    }
}
