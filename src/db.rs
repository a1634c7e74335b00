use sqlx::MySqlPool;

pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPool::connect(database_url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Creates the tables on first start (CREATE TABLE IF NOT EXISTS).
pub async fn run_migrations(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    // -------------------------
    // users
    // -------------------------
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            CHAR(36)     NOT NULL PRIMARY KEY,
            email         VARCHAR(255) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            name          VARCHAR(255) NOT NULL,
            nip           VARCHAR(64)  NOT NULL,
            pangkat       VARCHAR(128) NULL,
            jabatan       VARCHAR(255) NOT NULL,
            role          VARCHAR(16)  NOT NULL DEFAULT 'User',
            created_at    DATETIME(3)  NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
            UNIQUE KEY uq_users_email (email)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // -------------------------
    // refresh_tokens
    // -------------------------
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id         BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
            user_id    CHAR(36)        NOT NULL,
            jti        CHAR(36)        NOT NULL,
            expires_at DATETIME(3)     NOT NULL,
            revoked    TINYINT(1)      NOT NULL DEFAULT 0,
            UNIQUE KEY uq_refresh_tokens_jti (jti)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // -------------------------
    // overtime_records
    // active_employee_id is only set while the record is checked in, so the
    // unique key allows one open session per employee.
    // -------------------------
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS overtime_records (
            id                   CHAR(36)     NOT NULL PRIMARY KEY,
            employee_id          CHAR(36)     NOT NULL,
            employee_name        VARCHAR(255) NOT NULL,
            check_in_time        DATETIME(3)  NOT NULL,
            check_out_time       DATETIME(3)  NULL,
            check_in_photo       TEXT         NULL,
            check_out_photo      TEXT         NULL,
            check_in_latitude    DOUBLE       NULL,
            check_in_longitude   DOUBLE       NULL,
            check_out_latitude   DOUBLE       NULL,
            check_out_longitude  DOUBLE       NULL,
            status               VARCHAR(16)  NOT NULL,
            purpose              TEXT         NOT NULL,
            verification_status  VARCHAR(16)  NOT NULL DEFAULT 'Pending',
            verification_notes   TEXT         NULL,
            check_in_validation  TEXT         NULL,
            check_out_validation TEXT         NULL,
            created_at           DATETIME(3)  NOT NULL,
            active_employee_id   CHAR(36) AS (IF(status = 'Checked In', employee_id, NULL)) STORED,
            UNIQUE KEY uq_overtime_active (active_employee_id),
            KEY idx_overtime_employee (employee_id, created_at),
            KEY idx_overtime_check_in (check_in_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
