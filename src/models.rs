use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dates::DateRange;
use crate::error::StatsError;

/// Per-record attendance marks. A student holds at most one status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMarks {
    pub present: BTreeSet<Uuid>,
    pub absent: BTreeSet<Uuid>,
    pub late: BTreeSet<Uuid>,
    pub leave: BTreeSet<Uuid>,
    pub internship: BTreeSet<Uuid>,
}

impl StatusMarks {
    pub fn new(
        record: Uuid,
        present: Vec<Uuid>,
        absent: Vec<Uuid>,
        late: Vec<Uuid>,
        leave: Vec<Uuid>,
        internship: Vec<Uuid>,
    ) -> Result<Self, StatsError> {
        let [present, absent, late, leave, internship] = [present, absent, late, leave, internship]
            .map(|ids| ids.into_iter().collect::<BTreeSet<Uuid>>());

        // Repeats inside one status collapse; across statuses they conflict.
        let mut seen = BTreeSet::new();
        for student in [&present, &absent, &late, &leave, &internship]
            .into_iter()
            .flatten()
        {
            if !seen.insert(*student) {
                return Err(StatsError::OverlappingStatus {
                    record,
                    student: *student,
                });
            }
        }

        Ok(Self {
            present,
            absent,
            late,
            leave,
            internship,
        })
    }

    pub fn marked_total(&self) -> usize {
        self.present.len()
            + self.absent.len()
            + self.late.len()
            + self.leave.len()
            + self.internship.len()
    }

    pub fn checked_in(&self) -> usize {
        self.present.len() + self.late.len()
    }

    pub fn not_checked_in(&self) -> usize {
        self.absent.len() + self.leave.len() + self.internship.len()
    }

    pub fn students(&self) -> impl Iterator<Item = &Uuid> {
        self.present
            .iter()
            .chain(&self.absent)
            .chain(&self.late)
            .chain(&self.leave)
            .chain(&self.internship)
    }
}

#[derive(Debug, Clone)]
pub struct CheckInRecord {
    pub id: Uuid,
    pub classroom_id: Option<Uuid>,
    pub classroom_name: Option<String>,
    pub teacher_id: Option<Uuid>,
    pub check_in_date: DateTime<Utc>,
    pub marks: StatusMarks,
}

impl CheckInRecord {
    pub fn day(&self) -> NaiveDate {
        self.check_in_date.date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct TeacherSummary {
    pub id: Uuid,
    pub teacher_code: String,
    pub title: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub department_name: Option<String>,
    pub program_name: Option<String>,
}

impl TeacherSummary {
    pub fn display_name(&self) -> String {
        [
            self.title.as_deref().unwrap_or(""),
            self.first_name.as_str(),
            self.last_name.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Organizational scope applied to students, records and the teacher roster.
#[derive(Debug, Clone, Default)]
pub struct OrgFilter {
    pub department: Option<String>,
    pub program: Option<String>,
    pub classroom: Option<Uuid>,
}

impl OrgFilter {
    pub fn label(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.department.clone(),
            self.program.clone(),
            self.classroom.map(|id| format!("classroom {id}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" / "))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub date_range: DateRange,
    pub student_check_in_stats: StudentCheckInStats,
    pub teacher_usage_stats: TeacherUsageStats,
    pub daily_breakdown: Vec<DailyBreakdown>,
    pub daily_chart_data: Vec<DailyChartPoint>,
    pub classroom_stats: Vec<ClassroomStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCheckInStats {
    pub total_students: usize,
    pub students_checked_in: usize,
    pub check_in_percentage: f64,
    pub students_not_checked_in: i64,
    pub not_checked_in_percentage: f64,
    pub total_check_in_days: usize,
    pub average_attendance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherUsageStats {
    pub total_teachers: usize,
    pub active_teachers: usize,
    pub active_percentage: f64,
    pub inactive_teachers: usize,
    pub inactive_percentage: f64,
    pub teacher_activity_details: Vec<TeacherActivity>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherActivity {
    pub id: Uuid,
    pub teacher_id: String,
    pub teacher_name: String,
    pub check_in_count: usize,
    pub last_check_in_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBreakdown {
    pub date: NaiveDate,
    pub checked_in: usize,
    pub not_checked_in: usize,
    pub total_students: usize,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChartPoint {
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub leave: usize,
    pub internship: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomStats {
    pub classroom_id: Uuid,
    pub classroom_name: String,
    pub total_students: usize,
    pub average_attendance: f64,
    pub check_in_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_statuses_are_rejected() {
        let record = Uuid::new_v4();
        let student = Uuid::new_v4();
        let err = StatusMarks::new(record, vec![student], vec![], vec![student], vec![], vec![])
            .unwrap_err();
        assert_eq!(err, StatsError::OverlappingStatus { record, student });
    }

    #[test]
    fn repeats_within_one_status_collapse() {
        let student = Uuid::new_v4();
        let marks = StatusMarks::new(
            Uuid::new_v4(),
            vec![student, student],
            vec![Uuid::new_v4()],
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        assert_eq!(marks.present.len(), 1);
        assert_eq!(marks.marked_total(), 2);
        assert_eq!(marks.checked_in(), 1);
        assert_eq!(marks.not_checked_in(), 1);
    }

    #[test]
    fn teacher_name_skips_missing_parts() {
        let teacher = TeacherSummary {
            id: Uuid::new_v4(),
            teacher_code: "T-01".to_string(),
            title: None,
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            department_name: None,
            program_name: None,
        };
        assert_eq!(teacher.display_name(), "Avery Lee");

        let titled = TeacherSummary {
            title: Some("Dr.".to_string()),
            ..teacher
        };
        assert_eq!(titled.display_name(), "Dr. Avery Lee");
    }

    #[test]
    fn filter_label_joins_set_parts() {
        assert_eq!(OrgFilter::default().label(), None);
        let filter = OrgFilter {
            department: Some("Engineering".to_string()),
            program: Some("Electronics".to_string()),
            classroom: None,
        };
        assert_eq!(filter.label().as_deref(), Some("Engineering / Electronics"));
    }
}
