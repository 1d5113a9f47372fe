//! Terminal render ports: roster and dashboard output as plain tables.

use comfy_table::{Cell, ContentArrangement, Table};
use schooldocs_core::api::{Document, Student, StudentDetail};
use schooldocs_core::dashboard::{DashboardView, Module, ProfileSummary};
use schooldocs_core::error::ApiError;
use schooldocs_core::format;
use schooldocs_core::roster::RosterView;
use schooldocs_core::session::Role;

pub fn table<I>(header: I) -> Table
where
    I: IntoIterator,
    I::Item: Into<Cell>,
{
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

pub fn documents_table(documents: &[Document]) -> Table {
    let mut table = table(["ID", "Name", "Type", "Size", "Category", "Uploaded"]);
    for doc in documents {
        table.add_row(vec![
            doc.id.to_string(),
            doc.original_name.clone().unwrap_or_else(|| doc.name.clone()),
            format::file_kind(doc.file_type.as_deref()).to_string(),
            format::file_size(doc.file_size),
            format::or_not_set(doc.category.as_deref()).to_string(),
            format::relative_date(doc.created_at.as_deref()),
        ]);
    }
    table
}

/// Prints the roster to stdout; progress and errors go to stderr.
pub struct TerminalRoster;

impl RosterView for TerminalRoster {
    fn render_students(&self, students: &[Student]) {
        if students.is_empty() {
            println!("No students found.");
            return;
        }
        let mut table = table(["ID", "Name", "Student ID", "Grade", "Class", "Email", "Docs"]);
        for s in students {
            table.add_row(vec![
                s.id.to_string(),
                s.name.clone(),
                format::or_not_set(s.student_id.as_deref()).to_string(),
                format::or_not_set(s.grade.as_deref()).to_string(),
                format::or_not_set(s.class_name.as_deref()).to_string(),
                s.email.clone(),
                s.document_count.unwrap_or(0).to_string(),
            ]);
        }
        println!("{table}");
        println!("{} student(s)", students.len());
    }

    fn render_load_error(&self, error: &ApiError) {
        eprintln!("Could not load students: {error}");
    }

    fn render_detail_loading(&self, student_id: i64) {
        eprintln!("Loading student {student_id}...");
    }

    fn render_detail(&self, detail: &StudentDetail) {
        let s = &detail.student;
        println!("[{}] {}", format::initials(&s.name), s.name);
        println!("  Email:      {}", format::or_not_set(Some(s.email.as_str())));
        println!("  Student ID: {}", format::or_not_set(s.student_id.as_deref()));
        println!("  Grade:      {}", format::or_not_set(s.grade.as_deref()));
        println!("  Class:      {}", format::or_not_set(s.class_name.as_deref()));
        println!("  Joined:     {}", format::date_time(s.created_at.as_deref()));
        println!();

        if detail.documents.is_empty() {
            println!("No documents uploaded.");
        } else {
            println!("{}", documents_table(&detail.documents));
        }
    }

    fn render_detail_error(&self, student_id: i64, error: &ApiError) {
        eprintln!("Could not load student {student_id}: {error}");
    }

    fn close_detail(&self) {}
}

/// Prints the dashboard hub.
pub struct TerminalDashboard;

impl TerminalDashboard {
    fn command_for(module: &Module) -> &'static str {
        match module.key {
            "documents" => "schooldocs documents list",
            "profile" => "schooldocs profile update --help",
            "students" => "schooldocs students list",
            _ => "",
        }
    }
}

impl DashboardView for TerminalDashboard {
    fn render_profile(&self, summary: &ProfileSummary) {
        let name = summary.name.as_deref().unwrap_or("Student");
        let role = summary.role.map_or(format::UNKNOWN, Role::as_str);
        println!("[{}] {name} ({role})", format::initials(name));
        println!("  Student ID: {}", format::or_not_set(summary.student_id.as_deref()));
        println!("  Grade:      {}", format::or_not_set(summary.grade.as_deref()));
        println!("  Class:      {}", format::or_not_set(summary.class_name.as_deref()));
        println!();
    }

    fn render_modules(&self, modules: &[Module]) {
        let mut table = table(["Module", "Command"]);
        for module in modules {
            table.add_row(vec![module.title, Self::command_for(module)]);
        }
        println!("{table}");
    }

    fn redirect_to_login(&self) {
        eprintln!("Please log in first: schooldocs login --email <EMAIL>");
    }
}
