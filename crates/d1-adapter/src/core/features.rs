/// Capability flags consumed by the ORM's compiler/planner. Read-only after
/// module initialization; never mutated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub has_select_for_update: bool,
    pub has_native_uuid_field: bool,
    pub supports_transactions: bool,
    pub supports_savepoints: bool,
    pub can_rollback_ddl: bool,
    pub can_release_savepoints: bool,
    pub supports_atomic_references_rename: bool,
    pub can_create_inline_fk: bool,
    pub order_by_nulls_first: bool,
    pub has_bulk_insert: bool,
    pub can_return_columns_from_insert: bool,
    pub max_query_params: usize,
    pub minimum_database_version: u32,
}

pub const CAPABILITIES: Capabilities = Capabilities {
    has_select_for_update: true,
    has_native_uuid_field: false,
    supports_transactions: false,
    supports_savepoints: false,
    can_rollback_ddl: false,
    can_release_savepoints: false,
    supports_atomic_references_rename: false,
    can_create_inline_fk: false,
    order_by_nulls_first: true,
    has_bulk_insert: true,
    can_return_columns_from_insert: true,
    max_query_params: 100,
    minimum_database_version: 4,
};

/// Multi-row VALUES clause for bulk inserts, one parenthesized group per
/// placeholder row.
pub fn bulk_insert_values(placeholder_rows: &[Vec<&str>]) -> String {
    let groups: Vec<String> = placeholder_rows
        .iter()
        .map(|row| format!("({})", row.join(", ")))
        .collect();
    format!("VALUES {}", groups.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_facing_flags() {
        assert!(!CAPABILITIES.supports_transactions);
        assert!(!CAPABILITIES.supports_savepoints);
        assert!(!CAPABILITIES.has_native_uuid_field);
        assert!(CAPABILITIES.has_select_for_update);
        assert!(CAPABILITIES.order_by_nulls_first);
        assert_eq!(CAPABILITIES.max_query_params, 100);
    }

    #[test]
    fn bulk_insert_builds_multi_row_values() {
        let sql = bulk_insert_values(&[vec!["%s", "%s"], vec!["%s", "%s"]]);
        assert_eq!(sql, "VALUES (%s, %s), (%s, %s)");
    }
}
