use super::*;
use diesel::upsert::excluded;

table! {
    grade_records (identity_number, module_id) {
        identity_number -> Varchar,
        display_name -> Varchar,
        module_id -> Varchar,
        grade_value -> Varchar,
        grade_date -> Date,
        course_code -> Varchar,
    }
}

#[derive(Insertable)]
#[diesel(table_name = grade_records)]
struct GradePrivateNew<'a> {
    identity_number: &'a str,
    display_name: &'a str,
    module_id: &'a str,
    grade_value: &'a str,
    grade_date: NaiveDate,
    course_code: &'a str,
}

fn build_new_row(record: &GradeRecord) -> GradePrivateNew<'_> {
    GradePrivateNew {
        identity_number: &record.identity_number,
        display_name: &record.display_name,
        module_id: &record.module_id,
        grade_value: &record.grade_value,
        grade_date: record.date,
        course_code: &record.course_code,
    }
}

/// Insert a grade, or overwrite name, grade, date and course of the row
/// already stored under `(identity_number, module_id)`.
pub fn upsert_grade_record(conn: &mut PgConnection, record: &GradeRecord) -> Result<(), String> {
    use self::grade_records::dsl::*;

    let insert_row = build_new_row(record);

    diesel::insert_into(grade_records)
        .values(&insert_row)
        .on_conflict((identity_number, module_id))
        .do_update()
        .set((
            display_name.eq(excluded(display_name)),
            grade_value.eq(excluded(grade_value)),
            grade_date.eq(excluded(grade_date)),
            course_code.eq(excluded(course_code)),
        ))
        .execute(conn)
        .map_err(|err| err.to_string())?;

    Ok(())
}
