use super::*;

table! {
    roster_entries (course_code, assignment_name, roster_key) {
        roster_key -> Varchar,
        course_code -> Varchar,
        display_name -> Varchar,
        assignment_name -> Varchar,
        grade_value -> Nullable<Varchar>,
        entry_date -> Nullable<Date>,
    }
}

#[derive(Queryable)]
#[diesel(table_name = roster_entries)]
struct RosterPrivate {
    roster_key: String,
    course_code: String,
    display_name: String,
    assignment_name: String,
    grade_value: Option<String>,
    entry_date: Option<NaiveDate>,
}

fn private_to_public(p: RosterPrivate) -> StudentRow {
    StudentRow {
        roster_key: p.roster_key,
        course_code: p.course_code,
        display_name: p.display_name,
        grade_value: p.grade_value.unwrap_or_default(),
        assignment_name: p.assignment_name,
        date: p.entry_date,
    }
}

pub fn get_roster_by_course(
    conn: &mut PgConnection,
    in_course_code: &str,
    in_assignment_name: Option<&str>,
) -> Result<Vec<StudentRow>, String> {
    use self::roster_entries::dsl::*;

    let mut query = roster_entries
        .filter(course_code.eq(in_course_code))
        .into_boxed();
    if let Some(name) = in_assignment_name {
        query = query.filter(assignment_name.eq(name));
    }

    let items_private: Vec<RosterPrivate> = query
        .order((assignment_name.asc(), display_name.asc(), roster_key.asc()))
        .load(conn)
        .map_err(|err| err.to_string())?;

    Ok(items_private.into_iter().map(private_to_public).collect())
}

pub fn get_assignments_by_course(
    conn: &mut PgConnection,
    in_course_code: &str,
) -> Result<Vec<String>, String> {
    use self::roster_entries::dsl::*;

    roster_entries
        .filter(course_code.eq(in_course_code))
        .select(assignment_name)
        .distinct()
        .order(assignment_name.asc())
        .load::<String>(conn)
        .map_err(|err| err.to_string())
}
