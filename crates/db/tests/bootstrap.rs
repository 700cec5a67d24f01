use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify seed data.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    oa_db::health_check(&pool).await.unwrap();

    let tables = [
        "users",
        "departments",
        "roles",
        "permissions",
        "workflow_types",
        "workflow_definitions",
        "workflow_nodes",
        "workflow_instances",
        "workflow_tasks",
        "approval_records",
        "meeting_rooms",
        "meeting_reservations",
        "meeting_room_maintenance",
        "meeting_minutes",
    ];
    for table in tables {
        sqlx::query(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
    }
}

/// Every permission tag known to the code is seeded, and admin holds all of them.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_permission_seed_matches_code(pool: PgPool) {
    let tags: Vec<String> = sqlx::query_scalar("SELECT tag FROM permissions ORDER BY tag")
        .fetch_all(&pool)
        .await
        .unwrap();
    let mut expected: Vec<String> = oa_core::permissions::ALL.iter().map(|t| t.to_string()).collect();
    expected.sort();
    assert_eq!(tags, expected);

    let admin_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM role_permissions rp
         JOIN roles r ON r.id = rp.role_id
         WHERE r.code = 'admin'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(admin_count as usize, oa_core::permissions::ALL.len());
}

/// The employee role only carries self-service tags.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_employee_role_is_self_service(pool: PgPool) {
    let tags: Vec<String> = sqlx::query_scalar(
        "SELECT p.tag FROM permissions p
         JOIN role_permissions rp ON rp.permission_id = p.id
         JOIN roles r ON r.id = rp.role_id
         WHERE r.code = 'employee'
         ORDER BY p.tag",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        tags,
        [
            "approval:record:create",
            "meeting:minutes:write",
            "meeting:reservation:create",
            "workflow:instance:start",
        ]
    );
}
