use super::*;

table! {
    student_identities (roster_key) {
        roster_key -> Varchar,
        identity_number -> Varchar,
    }
}

pub fn get_identities_by_roster_keys(
    conn: &mut PgConnection,
    roster_keys: &[String],
) -> Result<Vec<IdentityEntry>, String> {
    use self::student_identities::dsl::*;

    let rows: Vec<(String, String)> = student_identities
        .filter(roster_key.eq_any(roster_keys))
        .select((roster_key, identity_number))
        .load(conn)
        .map_err(|err| err.to_string())?;

    Ok(rows
        .into_iter()
        .map(|(key, number)| IdentityEntry {
            roster_key: key,
            identity_number: number,
        })
        .collect())
}
