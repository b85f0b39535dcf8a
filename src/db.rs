use anyhow::{bail, Context};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::dates::{self, DateRange};
use crate::models::{CheckInRecord, OrgFilter, StatusMarks, TeacherSummary};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const ENGINEERING: Uuid = Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_0001);
const ELECTRONICS: Uuid = Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_0101);
const MECHATRONICS: Uuid = Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_0102);
const ROOM_EL1: Uuid = Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_0201);
const ROOM_MT1: Uuid = Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_0202);

fn seed_student(n: u128) -> Uuid {
    Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_1000 + n)
}

fn seed_teacher(n: u128) -> Uuid {
    Uuid::from_u128(0x6f1c_2a9e_0d4b_4c31_9e57_1a2b_3c4d_2000 + n)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO term_attendance.departments (id, name)
        VALUES ($1, 'Engineering')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(ENGINEERING)
    .execute(pool)
    .await?;

    for (id, name) in [(ELECTRONICS, "Electronics"), (MECHATRONICS, "Mechatronics")] {
        sqlx::query(
            r#"
            INSERT INTO term_attendance.programs (id, name, department_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(ENGINEERING)
        .execute(pool)
        .await?;
    }

    for (id, name, program) in [(ROOM_EL1, "EL-1", ELECTRONICS), (ROOM_MT1, "MT-1", MECHATRONICS)] {
        sqlx::query(
            r#"
            INSERT INTO term_attendance.classrooms (id, name, department_id, program_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(ENGINEERING)
        .bind(program)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (1, "S-001", "Avery Lee", ROOM_EL1, false),
        (2, "S-002", "Jules Moreno", ROOM_EL1, false),
        (3, "S-003", "Kiara Patel", ROOM_EL1, false),
        (4, "S-004", "Noah Brandt", ROOM_MT1, false),
        (5, "S-005", "Mina Okafor", ROOM_MT1, false),
        (6, "S-006", "Theo Varga", ROOM_MT1, true),
    ];

    for (n, code, name, classroom, graduated) in students {
        sqlx::query(
            r#"
            INSERT INTO term_attendance.students (id, student_code, full_name, classroom_id, graduated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_code) DO UPDATE
            SET full_name = EXCLUDED.full_name, graduated = EXCLUDED.graduated
            "#,
        )
        .bind(seed_student(n))
        .bind(code)
        .bind(name)
        .bind(classroom)
        .bind(graduated)
        .execute(pool)
        .await?;
    }

    let teachers = vec![
        (1, "T-01", Some("Dr."), "Rosa", "Lindqvist", ELECTRONICS),
        (2, "T-02", None, "Omar", "Haddad", MECHATRONICS),
        (3, "T-03", Some("Ms."), "Priya", "Nair", ELECTRONICS),
    ];

    for (n, code, title, first_name, last_name, program) in teachers {
        sqlx::query(
            r#"
            INSERT INTO term_attendance.teachers
            (id, teacher_code, title, first_name, last_name, department_id, program_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (teacher_code) DO UPDATE
            SET title = EXCLUDED.title, first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
            "#,
        )
        .bind(seed_teacher(n))
        .bind(code)
        .bind(title)
        .bind(first_name)
        .bind(last_name)
        .bind(ENGINEERING)
        .bind(program)
        .execute(pool)
        .await?;
    }

    let check_ins = vec![
        ("seed-001", ROOM_EL1, 1, (2026, 2, 2), vec![1, 2], vec![], vec![3]),
        ("seed-002", ROOM_EL1, 1, (2026, 2, 3), vec![1], vec![2], vec![3]),
        ("seed-003", ROOM_MT1, 2, (2026, 2, 3), vec![4], vec![5], vec![]),
    ];

    for (source_key, classroom, teacher, (year, month, day), present, absent, late) in check_ins {
        let check_in_date = Utc
            .with_ymd_and_hms(year, month, day, 8, 0, 0)
            .single()
            .context("invalid date")?;
        let ids = |students: Vec<u128>| students.into_iter().map(seed_student).collect::<Vec<_>>();

        sqlx::query(
            r#"
            INSERT INTO term_attendance.check_in_records
            (id, classroom_id, teacher_id, check_in_date, present, absent, late, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(classroom)
        .bind(seed_teacher(teacher))
        .bind(check_in_date)
        .bind(ids(present))
        .bind(ids(absent))
        .bind(ids(late))
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Non-graduated students within the filter.
pub async fn count_students(pool: &PgPool, filter: &OrgFilter) -> anyhow::Result<usize> {
    let count: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS total
        FROM term_attendance.students s
        LEFT JOIN term_attendance.classrooms c ON c.id = s.classroom_id
        LEFT JOIN term_attendance.departments d ON d.id = c.department_id
        LEFT JOIN term_attendance.programs p ON p.id = c.program_id
        WHERE NOT s.graduated
          AND ($1::text IS NULL OR d.name = $1)
          AND ($2::text IS NULL OR p.name = $2)
          AND ($3::uuid IS NULL OR s.classroom_id = $3)
        "#,
    )
    .bind(filter.department.as_deref())
    .bind(filter.program.as_deref())
    .bind(filter.classroom)
    .fetch_one(pool)
    .await?
    .try_get("total")?;

    usize::try_from(count).context("negative student count")
}

pub async fn fetch_check_in_records(
    pool: &PgPool,
    range: &DateRange,
    filter: &OrgFilter,
) -> anyhow::Result<Vec<CheckInRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.classroom_id, c.name AS classroom_name, r.teacher_id, r.check_in_date,
               r.present, r.absent, r.late, r.on_leave, r.internship
        FROM term_attendance.check_in_records r
        LEFT JOIN term_attendance.classrooms c ON c.id = r.classroom_id
        LEFT JOIN term_attendance.departments d ON d.id = c.department_id
        LEFT JOIN term_attendance.programs p ON p.id = c.program_id
        WHERE r.check_in_date >= $1 AND r.check_in_date <= $2
          AND ($3::text IS NULL OR d.name = $3)
          AND ($4::text IS NULL OR p.name = $4)
          AND ($5::uuid IS NULL OR r.classroom_id = $5)
        ORDER BY r.check_in_date
        "#,
    )
    .bind(range.start)
    .bind(range.end)
    .bind(filter.department.as_deref())
    .bind(filter.program.as_deref())
    .bind(filter.classroom)
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(record_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing::info!(records = records.len(), "fetched check-in records");
    Ok(records)
}

fn record_from_row(row: &PgRow) -> anyhow::Result<CheckInRecord> {
    let id: Uuid = row.try_get("id")?;
    let marks = StatusMarks::new(
        id,
        row.try_get("present")?,
        row.try_get("absent")?,
        row.try_get("late")?,
        row.try_get("on_leave")?,
        row.try_get("internship")?,
    )?;

    Ok(CheckInRecord {
        id,
        classroom_id: row.try_get("classroom_id")?,
        classroom_name: row.try_get("classroom_name")?,
        teacher_id: row.try_get("teacher_id")?,
        check_in_date: row.try_get("check_in_date")?,
        marks,
    })
}

/// Roster for the department/program part of the filter, by teacher code.
pub async fn fetch_teachers(pool: &PgPool, filter: &OrgFilter) -> anyhow::Result<Vec<TeacherSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.teacher_code, t.title, t.first_name, t.last_name,
               d.name AS department_name, p.name AS program_name
        FROM term_attendance.teachers t
        LEFT JOIN term_attendance.departments d ON d.id = t.department_id
        LEFT JOIN term_attendance.programs p ON p.id = t.program_id
        WHERE ($1::text IS NULL OR d.name = $1)
          AND ($2::text IS NULL OR p.name = $2)
        ORDER BY t.teacher_code
        "#,
    )
    .bind(filter.department.as_deref())
    .bind(filter.program.as_deref())
    .fetch_all(pool)
    .await?;

    let mut teachers = Vec::new();

    for row in rows {
        teachers.push(TeacherSummary {
            id: row.try_get("id")?,
            teacher_code: row.try_get("teacher_code")?,
            title: row.try_get("title")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            department_name: row.try_get("department_name")?,
            program_name: row.try_get("program_name")?,
        });
    }

    Ok(teachers)
}

/// Splits a `;`-separated list of student ids.
pub fn parse_id_list(text: &str) -> anyhow::Result<Vec<Uuid>> {
    text.split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Uuid::parse_str(value).with_context(|| format!("invalid student id {value}")))
        .collect()
}

struct PendingCheckIn {
    id: Uuid,
    source_key: String,
    classroom: Option<String>,
    teacher_code: Option<String>,
    check_in_date: DateTime<Utc>,
    marks: StatusMarks,
}

/// Parses and validates every row; one bad row rejects the whole file.
fn read_check_ins<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> anyhow::Result<Vec<PendingCheckIn>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        source_key: Option<String>,
        classroom: Option<String>,
        teacher_code: Option<String>,
        check_in_date: String,
        #[serde(default)]
        present: String,
        #[serde(default)]
        absent: String,
        #[serde(default)]
        late: String,
        #[serde(default)]
        leave: String,
        #[serde(default)]
        internship: String,
    }

    let mut pending = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row_label = || format!("row {}", line + 1);
        let row = result.with_context(row_label)?;
        let id = Uuid::new_v4();
        let check_in_date = dates::parse_instant(&row.check_in_date, "check-in date")
            .with_context(row_label)?;
        let marks = StatusMarks::new(
            id,
            parse_id_list(&row.present).with_context(row_label)?,
            parse_id_list(&row.absent).with_context(row_label)?,
            parse_id_list(&row.late).with_context(row_label)?,
            parse_id_list(&row.leave).with_context(row_label)?,
            parse_id_list(&row.internship).with_context(row_label)?,
        )
        .with_context(row_label)?;

        pending.push(PendingCheckIn {
            id,
            source_key: row
                .source_key
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
            classroom: row.classroom,
            teacher_code: row.teacher_code,
            check_in_date,
            marks,
        });
    }

    Ok(pending)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let pending = read_check_ins(reader)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for check_in in pending {
        let classroom_id = match check_in.classroom.as_deref() {
            Some(name) => Some(lookup_id(&mut tx, "classrooms", "name", name).await?),
            None => None,
        };
        let teacher_id = match check_in.teacher_code.as_deref() {
            Some(code) => Some(lookup_id(&mut tx, "teachers", "teacher_code", code).await?),
            None => None,
        };

        let marks = &check_in.marks;
        let as_vec = |ids: &std::collections::BTreeSet<Uuid>| ids.iter().copied().collect::<Vec<_>>();
        let result = sqlx::query(
            r#"
            INSERT INTO term_attendance.check_in_records
            (id, classroom_id, teacher_id, check_in_date, present, absent, late, on_leave, internship, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(check_in.id)
        .bind(classroom_id)
        .bind(teacher_id)
        .bind(check_in.check_in_date)
        .bind(as_vec(&marks.present))
        .bind(as_vec(&marks.absent))
        .bind(as_vec(&marks.late))
        .bind(as_vec(&marks.leave))
        .bind(as_vec(&marks.internship))
        .bind(&check_in.source_key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        } else {
            tracing::debug!(source_key = %check_in.source_key, "skipping duplicate check-in");
        }
    }

    tx.commit().await?;

    tracing::info!(inserted, path = %csv_path.display(), "imported check-in records");
    Ok(inserted)
}

async fn lookup_id(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    value: &str,
) -> anyhow::Result<Uuid> {
    let query = format!("SELECT id FROM term_attendance.{table} WHERE {column} = $1");
    let row = sqlx::query(&query).bind(value).fetch_optional(&mut *conn).await?;

    match row {
        Some(row) => Ok(row.try_get("id")?),
        None => bail!("unknown {column} {value} in {table}"),
    }
}
