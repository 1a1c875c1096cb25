//! Session macros for the sqlx-backed dialects.
//!
//! The three sqlx connections differ only in their type and in how an
//! explicit transaction is opened, so one macro generates each session.

/// Generate a [`NativeSession`](crate::db::driver::NativeSession) over a
/// single sqlx connection.
///
/// # Example
///
/// ```ignore
/// impl_sqlx_session!(PgSession, sqlx::PgConnection, begin = "BEGIN");
/// ```
#[macro_export]
macro_rules! impl_sqlx_session {
    ($session:ident, $conn:ty, begin = $begin:literal) => {
        pub struct $session {
            conn: $conn,
        }

        impl $session {
            /// Open the connection from a driver URL.
            pub async fn connect(url: &str) -> $crate::error::ConnectorResult<Self> {
                let conn = <$conn as sqlx::Connection>::connect(url).await?;
                Ok(Self { conn })
            }
        }

        #[async_trait::async_trait]
        impl $crate::db::driver::NativeSession for $session {
            async fn fetch(
                &mut self,
                sql: &str,
                params: &[&str],
            ) -> $crate::error::ConnectorResult<Vec<$crate::models::SqlRow>> {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(param.to_string());
                }
                let rows = query.fetch_all(&mut self.conn).await?;
                Ok(rows
                    .iter()
                    .map($crate::db::types::RowDecode::to_sql_row)
                    .collect())
            }

            // A bare `&str` carries no arguments, so it goes out as a simple
            // (unprepared) query
            async fn run(
                &mut self,
                sql: &str,
            ) -> $crate::error::ConnectorResult<Vec<$crate::models::SqlRow>> {
                let rows = sqlx::Executor::fetch_all(&mut self.conn, sql).await?;
                Ok(rows
                    .iter()
                    .map($crate::db::types::RowDecode::to_sql_row)
                    .collect())
            }

            async fn begin(&mut self) -> $crate::error::ConnectorResult<()> {
                sqlx::Executor::execute(&mut self.conn, $begin).await?;
                Ok(())
            }

            async fn commit(&mut self) -> $crate::error::ConnectorResult<()> {
                sqlx::Executor::execute(&mut self.conn, "COMMIT").await?;
                Ok(())
            }

            async fn rollback(&mut self) -> $crate::error::ConnectorResult<()> {
                sqlx::Executor::execute(&mut self.conn, "ROLLBACK").await?;
                Ok(())
            }

            async fn close(self: Box<Self>) -> $crate::error::ConnectorResult<()> {
                sqlx::Connection::close(self.conn).await?;
                Ok(())
            }
        }
    };
}

pub use impl_sqlx_session;
