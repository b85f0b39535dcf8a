use std::fmt::Write;

use crate::models::AggregateReport;

pub fn render_markdown(report: &AggregateReport, scope: Option<&str>) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all departments");
    let range = &report.date_range;

    let _ = writeln!(output, "# Term Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {}, {} days)",
        scope_label,
        range.start.date_naive(),
        range.end.date_naive(),
        range.days()
    );
    let _ = writeln!(output);

    let students = &report.student_check_in_stats;
    let _ = writeln!(output, "## Student Check-ins");
    let _ = writeln!(output, "- Students: {}", students.total_students);
    let _ = writeln!(
        output,
        "- Checked in: {} ({:.2}%)",
        students.students_checked_in, students.check_in_percentage
    );
    let _ = writeln!(
        output,
        "- Not checked in: {} ({:.2}%)",
        students.students_not_checked_in, students.not_checked_in_percentage
    );
    let _ = writeln!(output, "- Check-in days: {}", students.total_check_in_days);
    let _ = writeln!(
        output,
        "- Average attendance rate: {:.2}%",
        students.average_attendance_rate
    );

    let teachers = &report.teacher_usage_stats;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Teacher Usage");
    let _ = writeln!(
        output,
        "{} of {} teachers active ({:.2}%), {} inactive ({:.2}%)",
        teachers.active_teachers,
        teachers.total_teachers,
        teachers.active_percentage,
        teachers.inactive_teachers,
        teachers.inactive_percentage
    );

    if teachers.teacher_activity_details.is_empty() {
        let _ = writeln!(output, "No teachers in this scope.");
    } else {
        for teacher in teachers.teacher_activity_details.iter() {
            let last = teacher
                .last_check_in_date
                .map(|date| date.date_naive().to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                output,
                "- {} ({}): {} check-ins, last {}",
                teacher.teacher_name, teacher.teacher_id, teacher.check_in_count, last
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Breakdown");

    if report.daily_breakdown.is_empty() {
        let _ = writeln!(output, "No check-ins in this range.");
    } else {
        let _ = writeln!(output, "| Date | Checked in | Not checked in | Students | Rate |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for day in report.daily_breakdown.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.2}% |",
                day.date, day.checked_in, day.not_checked_in, day.total_students, day.attendance_rate
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classrooms");

    if report.classroom_stats.is_empty() {
        let _ = writeln!(output, "No classroom check-ins in this range.");
    } else {
        let _ = writeln!(output, "| Classroom | Check-ins | Students | Average attendance |");
        let _ = writeln!(output, "|---|---|---|---|");
        for classroom in report.classroom_stats.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.2}% |",
                classroom.classroom_name,
                classroom.check_in_count,
                classroom.total_students,
                classroom.average_attendance
            );
        }
    }

    output
}
