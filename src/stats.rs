//! Term attendance statistics.
//!
//! Everything here is a pure function of already-fetched rows. Calendar days
//! are UTC days (see [`CheckInRecord::day`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::dates::DateRange;
use crate::models::{
    AggregateReport, CheckInRecord, ClassroomStats, DailyBreakdown, DailyChartPoint,
    StudentCheckInStats, TeacherActivity, TeacherSummary, TeacherUsageStats,
};

pub fn compute_term_statistics(
    range: DateRange,
    total_student_count: usize,
    records: &[CheckInRecord],
    teachers: &[TeacherSummary],
) -> AggregateReport {
    let (daily_breakdown, daily_chart_data) = daily_breakdown(records, total_student_count);

    for record in records.iter().filter(|record| !range.contains(record.check_in_date)) {
        tracing::warn!(
            record = %record.id,
            check_in_date = %record.check_in_date,
            "check-in record outside the requested range"
        );
    }

    tracing::debug!(
        records = records.len(),
        teachers = teachers.len(),
        total_students = total_student_count,
        "computing term statistics"
    );

    AggregateReport {
        date_range: range,
        student_check_in_stats: student_check_in_stats(total_student_count, records),
        teacher_usage_stats: teacher_usage_stats(records, teachers),
        daily_breakdown,
        daily_chart_data,
        classroom_stats: classroom_stats(records, total_student_count),
    }
}

/// Rounds half away from zero at the second decimal.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

pub fn student_check_in_stats(
    total_student_count: usize,
    records: &[CheckInRecord],
) -> StudentCheckInStats {
    let checked_in: HashSet<Uuid> = records
        .iter()
        .flat_map(|record| record.marks.students().copied())
        .collect();
    let days: HashSet<NaiveDate> = records.iter().map(CheckInRecord::day).collect();
    let (present, marked) = records.iter().fold((0usize, 0usize), |(present, marked), record| {
        (
            present + record.marks.present.len(),
            marked + record.marks.marked_total(),
        )
    });

    let students_checked_in = checked_in.len();
    let students_not_checked_in = total_student_count as i64 - students_checked_in as i64;
    if students_not_checked_in < 0 {
        tracing::warn!(
            total_students = total_student_count,
            students_checked_in,
            "check-in records cover more students than the filtered student count"
        );
    }

    let check_in_percentage = percentage(students_checked_in, total_student_count);

    StudentCheckInStats {
        total_students: total_student_count,
        students_checked_in,
        check_in_percentage,
        students_not_checked_in,
        not_checked_in_percentage: round2(100.0 - check_in_percentage),
        total_check_in_days: days.len(),
        average_attendance_rate: percentage(present, marked),
    }
}

pub fn teacher_usage_stats(
    records: &[CheckInRecord],
    teachers: &[TeacherSummary],
) -> TeacherUsageStats {
    let mut tallies: HashMap<Uuid, (usize, Option<DateTime<Utc>>)> = HashMap::new();

    for record in records {
        let Some(teacher_id) = record.teacher_id else {
            continue;
        };
        let entry = tallies.entry(teacher_id).or_insert((0, None));
        entry.0 += 1;
        entry.1 = entry.1.max(Some(record.check_in_date));
    }

    let mut details: Vec<TeacherActivity> = teachers
        .iter()
        .map(|teacher| {
            let (count, last) = tallies.get(&teacher.id).copied().unwrap_or((0, None));
            TeacherActivity {
                id: teacher.id,
                teacher_id: teacher.teacher_code.clone(),
                teacher_name: teacher.display_name(),
                check_in_count: count,
                last_check_in_date: last,
                is_active: count > 0,
                department: teacher.department_name.clone(),
                program: teacher.program_name.clone(),
            }
        })
        .collect();

    // Stable: equal counts keep roster order.
    details.sort_by(|a, b| b.check_in_count.cmp(&a.check_in_count));

    let total_teachers = teachers.len();
    let active_teachers = details.iter().filter(|detail| detail.is_active).count();
    let inactive_teachers = total_teachers - active_teachers;

    TeacherUsageStats {
        total_teachers,
        active_teachers,
        active_percentage: percentage(active_teachers, total_teachers),
        inactive_teachers,
        inactive_percentage: percentage(inactive_teachers, total_teachers),
        teacher_activity_details: details,
    }
}

/// Returns the table and chart views of the per-day grouping, both ascending.
pub fn daily_breakdown(
    records: &[CheckInRecord],
    total_student_count: usize,
) -> (Vec<DailyBreakdown>, Vec<DailyChartPoint>) {
    let mut days: BTreeMap<NaiveDate, (DailyBreakdown, DailyChartPoint)> = BTreeMap::new();

    for record in records {
        let date = record.day();
        let (row, point) = days.entry(date).or_insert_with(|| {
            (
                DailyBreakdown {
                    date,
                    checked_in: 0,
                    not_checked_in: 0,
                    total_students: 0,
                    attendance_rate: 0.0,
                },
                DailyChartPoint {
                    date,
                    present: 0,
                    absent: 0,
                    late: 0,
                    leave: 0,
                    internship: 0,
                },
            )
        });

        let marks = &record.marks;
        row.checked_in += marks.checked_in();
        row.not_checked_in += marks.not_checked_in();
        row.total_students = row
            .total_students
            .max(marks.marked_total())
            .min(total_student_count);

        point.present += marks.present.len();
        point.absent += marks.absent.len();
        point.late += marks.late.len();
        point.leave += marks.leave.len();
        point.internship += marks.internship.len();
    }

    days.into_values()
        .map(|(mut row, point)| {
            if row.checked_in > 0 {
                row.attendance_rate = percentage(row.checked_in, total_student_count);
            }
            (row, point)
        })
        .unzip()
}

struct ClassroomTally {
    classroom_id: Uuid,
    classroom_name: String,
    records: usize,
    present: usize,
    total_students: usize,
}

pub fn classroom_stats(records: &[CheckInRecord], total_student_count: usize) -> Vec<ClassroomStats> {
    let mut order: HashMap<Uuid, usize> = HashMap::new();
    let mut tallies: Vec<ClassroomTally> = Vec::new();

    for record in records {
        let Some(classroom_id) = record.classroom_id else {
            continue;
        };
        let index = *order.entry(classroom_id).or_insert_with(|| {
            tallies.push(ClassroomTally {
                classroom_id,
                classroom_name: String::new(),
                records: 0,
                present: 0,
                total_students: 0,
            });
            tallies.len() - 1
        });
        let tally = &mut tallies[index];

        if tally.classroom_name.is_empty() {
            if let Some(name) = &record.classroom_name {
                tally.classroom_name = name.clone();
            }
        }
        tally.records += 1;
        tally.present += record.marks.present.len();

        // A candidate above the overall student count is ignored, not capped.
        let candidate = record.marks.marked_total();
        if candidate > tally.total_students && candidate <= total_student_count {
            tally.total_students = candidate;
        }
    }

    let mut stats: Vec<ClassroomStats> = tallies
        .into_iter()
        .map(|tally| ClassroomStats {
            classroom_id: tally.classroom_id,
            classroom_name: tally.classroom_name,
            total_students: tally.total_students,
            average_attendance: percentage(tally.present, tally.total_students * tally.records),
            check_in_count: tally.records,
        })
        .collect();

    stats.sort_by(|a, b| {
        b.average_attendance
            .partial_cmp(&a.average_attendance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::prepare_date_range;
    use crate::models::StatusMarks;
    use chrono::TimeZone;

    fn students(count: usize) -> Vec<Uuid> {
        (0..count).map(|_| Uuid::new_v4()).collect()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn record(
        check_in_date: DateTime<Utc>,
        classroom_id: Option<Uuid>,
        teacher_id: Option<Uuid>,
        present: Vec<Uuid>,
        absent: Vec<Uuid>,
    ) -> CheckInRecord {
        let id = Uuid::new_v4();
        CheckInRecord {
            id,
            classroom_id,
            classroom_name: classroom_id.map(|_| "Room 101".to_string()),
            teacher_id,
            check_in_date,
            marks: StatusMarks::new(id, present, absent, vec![], vec![], vec![]).unwrap(),
        }
    }

    fn teacher(code: &str) -> TeacherSummary {
        TeacherSummary {
            id: Uuid::new_v4(),
            teacher_code: code.to_string(),
            title: Some("Ms.".to_string()),
            first_name: "Kiara".to_string(),
            last_name: code.to_string(),
            department_name: Some("Engineering".to_string()),
            program_name: None,
        }
    }

    fn range() -> DateRange {
        prepare_date_range(Some("2024-03-01"), Some("2024-03-31")).unwrap()
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(100.0 / 3.0), 33.33);
        assert_eq!(round2(200.0 / 3.0), 66.67);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn single_record_coverage_and_attendance() {
        let roster = students(25);
        let records = vec![record(
            at(4, 8),
            Some(Uuid::new_v4()),
            None,
            roster[..20].to_vec(),
            roster[20..].to_vec(),
        )];

        let stats = student_check_in_stats(30, &records);
        assert_eq!(stats.students_checked_in, 25);
        assert_eq!(stats.students_not_checked_in, 5);
        assert_eq!(stats.check_in_percentage, 83.33);
        assert_eq!(stats.not_checked_in_percentage, 16.67);
        assert_eq!(stats.average_attendance_rate, 80.0);
        assert_eq!(stats.total_check_in_days, 1);
    }

    #[test]
    fn empty_inputs_produce_zero_report() {
        let teachers = vec![teacher("T-01"), teacher("T-02")];
        let report = compute_term_statistics(range(), 30, &[], &teachers);

        let stats = &report.student_check_in_stats;
        assert_eq!(stats.students_checked_in, 0);
        assert_eq!(stats.check_in_percentage, 0.0);
        assert_eq!(stats.not_checked_in_percentage, 100.0);
        assert_eq!(stats.total_check_in_days, 0);
        assert_eq!(stats.average_attendance_rate, 0.0);

        let usage = &report.teacher_usage_stats;
        assert!(usage.teacher_activity_details.iter().all(|t| !t.is_active));
        assert_eq!(usage.inactive_percentage, 100.0);
        assert!(report.daily_breakdown.is_empty());
        assert!(report.daily_chart_data.is_empty());
        assert!(report.classroom_stats.is_empty());
    }

    #[test]
    fn zero_student_count_reports_full_not_checked_in() {
        let records = vec![record(at(4, 8), None, None, students(3), vec![])];
        let stats = student_check_in_stats(0, &records);
        assert_eq!(stats.check_in_percentage, 0.0);
        assert_eq!(stats.not_checked_in_percentage, 100.0);
    }

    #[test]
    fn coverage_is_a_union_and_is_not_clamped() {
        let roster = students(4);
        let records = vec![
            record(at(4, 8), None, None, roster[..3].to_vec(), vec![]),
            record(at(5, 8), None, None, vec![roster[0]], vec![roster[3]]),
        ];

        let stats = student_check_in_stats(3, &records);
        assert_eq!(stats.students_checked_in, 4);
        assert_eq!(stats.students_not_checked_in, -1);
        assert_eq!(stats.total_check_in_days, 2);
    }

    #[test]
    fn classroom_average_over_two_days() {
        let classroom = Some(Uuid::new_v4());
        let roster = students(20);
        let records = vec![
            record(at(4, 8), classroom, None, roster[..10].to_vec(), roster[10..].to_vec()),
            record(at(5, 8), classroom, None, roster[..15].to_vec(), roster[15..].to_vec()),
        ];

        let stats = classroom_stats(&records, 20);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].average_attendance, 62.5);
        assert_eq!(stats[0].total_students, 20);
        assert_eq!(stats[0].check_in_count, 2);
        assert_eq!(stats[0].classroom_name, "Room 101");
    }

    #[test]
    fn classroom_total_ignores_candidates_above_student_count() {
        let classroom = Some(Uuid::new_v4());
        let records = vec![
            record(at(4, 8), classroom, None, students(8), vec![]),
            record(at(5, 8), classroom, None, students(12), vec![]),
        ];

        let stats = classroom_stats(&records, 10);
        assert_eq!(stats[0].total_students, 8);
        assert_eq!(stats[0].average_attendance, 125.0);
    }

    #[test]
    fn classrooms_sort_by_average_and_skip_missing_ids() {
        let weak = Some(Uuid::new_v4());
        let strong = Some(Uuid::new_v4());
        let roster = students(10);
        let records = vec![
            record(at(4, 8), weak, None, roster[..2].to_vec(), roster[2..].to_vec()),
            record(at(4, 9), strong, None, roster[..9].to_vec(), roster[9..].to_vec()),
            record(at(4, 10), None, None, roster.clone(), vec![]),
        ];

        let stats = classroom_stats(&records, 10);
        assert_eq!(stats.len(), 2);
        assert_eq!(Some(stats[0].classroom_id), strong);
        assert_eq!(stats[0].average_attendance, 90.0);
        assert_eq!(stats[1].average_attendance, 20.0);
    }

    #[test]
    fn classrooms_with_equal_averages_keep_first_seen_order() {
        let first = Some(Uuid::new_v4());
        let second = Some(Uuid::new_v4());
        let third = Some(Uuid::new_v4());
        let roster = students(4);
        let records = vec![
            record(at(4, 8), first, None, roster[..2].to_vec(), roster[2..].to_vec()),
            record(at(4, 9), second, None, roster[..2].to_vec(), roster[2..].to_vec()),
            record(at(4, 10), third, None, roster[..3].to_vec(), roster[3..].to_vec()),
        ];

        let stats = classroom_stats(&records, 4);
        let order: Vec<Option<Uuid>> = stats.iter().map(|c| Some(c.classroom_id)).collect();
        assert_eq!(order, vec![third, first, second]);
        assert_eq!(stats[1].average_attendance, 50.0);
        assert_eq!(stats[2].average_attendance, 50.0);
    }

    #[test]
    fn classroom_name_comes_from_first_named_record() {
        let classroom = Some(Uuid::new_v4());
        let mut nameless = record(at(4, 8), classroom, None, students(2), vec![]);
        nameless.classroom_name = None;
        let mut named = record(at(5, 8), classroom, None, students(2), vec![]);
        named.classroom_name = Some("EL-1".to_string());
        let mut renamed = record(at(6, 8), classroom, None, students(2), vec![]);
        renamed.classroom_name = Some("EL-1 (annex)".to_string());

        let stats = classroom_stats(&[nameless, named, renamed], 10);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].classroom_name, "EL-1");
        assert_eq!(stats[0].check_in_count, 3);
    }

    #[test]
    fn last_check_in_is_the_latest_instant_in_any_order() {
        let busy = teacher("T-01");
        let records = vec![
            record(at(9, 8), None, Some(busy.id), students(1), vec![]),
            record(at(9, 7), None, Some(busy.id), students(1), vec![]),
            record(at(3, 8), None, Some(busy.id), students(1), vec![]),
        ];

        let usage = teacher_usage_stats(&records, &[busy]);
        let detail = &usage.teacher_activity_details[0];
        assert_eq!(detail.check_in_count, 3);
        assert_eq!(detail.last_check_in_date, Some(at(9, 8)));
    }

    #[test]
    fn idle_teacher_sorts_last() {
        let busy = teacher("T-01");
        let idle = teacher("T-02");
        let records = vec![
            record(at(4, 8), None, Some(busy.id), students(2), vec![]),
            record(at(6, 8), None, Some(busy.id), students(2), vec![]),
            record(at(5, 8), None, Some(Uuid::new_v4()), students(2), vec![]),
        ];

        let usage = teacher_usage_stats(&records, &[idle.clone(), busy.clone()]);
        assert_eq!(usage.total_teachers, 2);
        assert_eq!(usage.active_teachers + usage.inactive_teachers, usage.total_teachers);
        assert_eq!(usage.active_percentage, 50.0);

        let first = &usage.teacher_activity_details[0];
        assert_eq!(first.id, busy.id);
        assert_eq!(first.check_in_count, 2);
        assert_eq!(first.last_check_in_date, Some(at(6, 8)));
        assert_eq!(first.teacher_name, "Ms. Kiara T-01");

        let last = &usage.teacher_activity_details[1];
        assert_eq!(last.id, idle.id);
        assert_eq!(last.check_in_count, 0);
        assert_eq!(last.last_check_in_date, None);
        assert!(!last.is_active);
    }

    #[test]
    fn equal_counts_keep_roster_order() {
        let roster = vec![teacher("T-01"), teacher("T-02"), teacher("T-03")];
        let usage = teacher_usage_stats(&[], &roster);
        let codes: Vec<&str> = usage
            .teacher_activity_details
            .iter()
            .map(|t| t.teacher_id.as_str())
            .collect();
        assert_eq!(codes, vec!["T-01", "T-02", "T-03"]);
        assert_eq!(teacher_usage_stats(&[], &[]).active_percentage, 0.0);
    }

    #[test]
    fn daily_views_are_sorted_with_one_row_per_day() {
        let roster = students(10);
        let mut late_record = record(at(4, 14), None, None, roster[..3].to_vec(), vec![]);
        late_record.marks.late.insert(roster[9]);
        let records = vec![
            record(at(6, 8), None, None, roster[..5].to_vec(), roster[5..7].to_vec()),
            record(at(4, 8), None, None, roster[..4].to_vec(), roster[4..6].to_vec()),
            late_record,
        ];

        let (table, chart) = daily_breakdown(&records, 10);
        let days: Vec<u32> = table.iter().map(|row| chrono::Datelike::day(&row.date)).collect();
        assert_eq!(days, vec![4, 6]);
        assert_eq!(chart.len(), 2);

        let first = &table[0];
        assert_eq!(first.checked_in, 8);
        assert_eq!(first.not_checked_in, 2);
        assert_eq!(first.total_students, 6);
        assert_eq!(first.attendance_rate, 80.0);

        assert_eq!(chart[0].present, 7);
        assert_eq!(chart[0].late, 1);
        assert_eq!(chart[0].absent, 2);
        assert_eq!(chart[1].present, 5);
    }

    #[test]
    fn daily_total_is_capped_and_rate_skipped_without_students() {
        let records = vec![record(at(4, 8), None, None, students(12), vec![])];

        let (table, _) = daily_breakdown(&records, 10);
        assert_eq!(table[0].total_students, 10);

        let (table, _) = daily_breakdown(&records, 0);
        assert_eq!(table[0].total_students, 0);
        assert_eq!(table[0].attendance_rate, 0.0);
    }

    #[test]
    fn identical_inputs_serialize_identically() {
        let roster = students(6);
        let teachers = vec![teacher("T-01"), teacher("T-02")];
        let records = vec![
            record(
                at(4, 8),
                Some(Uuid::new_v4()),
                Some(teachers[1].id),
                roster[..4].to_vec(),
                vec![],
            ),
            record(
                at(5, 8),
                Some(Uuid::new_v4()),
                Some(teachers[0].id),
                roster[..2].to_vec(),
                roster[2..].to_vec(),
            ),
        ];

        let first =
            serde_json::to_string(&compute_term_statistics(range(), 6, &records, &teachers)).unwrap();
        let second =
            serde_json::to_string(&compute_term_statistics(range(), 6, &records, &teachers)).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"studentCheckInStats\""));
        assert!(first.contains("\"date\":\"2024-03-04\""));
    }
}
