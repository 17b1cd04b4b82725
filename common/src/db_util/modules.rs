use super::*;

table! {
    grading_modules (module_id) {
        module_id -> Varchar,
        module_label -> Varchar,
        course_code -> Varchar,
    }
}

#[derive(Queryable)]
#[diesel(table_name = grading_modules)]
struct ModulePrivate {
    module_id: String,
    module_label: String,
    course_code: String,
}

fn private_to_public(p: ModulePrivate) -> GradingModule {
    GradingModule {
        module_id: p.module_id,
        module_label: p.module_label,
        course_code: p.course_code,
    }
}

pub fn get_modules_by_course(
    conn: &mut PgConnection,
    in_course_code: &str,
) -> Result<Vec<GradingModule>, String> {
    use self::grading_modules::dsl::*;

    let items_private: Vec<ModulePrivate> = grading_modules
        .filter(course_code.eq(in_course_code))
        .order(module_id.asc())
        .load(conn)
        .map_err(|err| err.to_string())?;

    Ok(items_private.into_iter().map(private_to_public).collect())
}
