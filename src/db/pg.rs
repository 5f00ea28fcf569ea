use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{BigInt, Text};
use serde_json::{Map, Value};

use super::{
    quote_ident, ColumnInfo, ColumnUpdate, PgPool, RawRow, RequestStore, RowOrder, RowSelect,
    StoreError, StoreResult,
};
use crate::models::{NewSideDocument, SideDocument};
use crate::schema::request_documents;

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
}

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = BigInt)]
    seq: i64,
    #[diesel(sql_type = Text)]
    data: String,
}

const LIST_TABLES_SQL: &str = "SELECT table_name::text AS name \
     FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const TABLE_COLUMNS_SQL: &str = "SELECT column_name::text AS name, data_type::text AS data_type \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

/// PostgreSQL-backed store. Request tables are read as `row_to_json` text so that rows of any
/// shape decode into one JSON object per row.
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| StoreError::Unavailable(format!("database pool error: {err}")))
    }
}

/// The sequence is numbered over the whole table inside the subquery, so filtered selects keep
/// the same `seq` a full scan would report.
pub(crate) fn build_select_sql(select: &RowSelect<'_>) -> String {
    let mut sql = format!(
        "SELECT s.seq, row_to_json(s.r)::text AS data FROM \
         (SELECT t AS r, (row_number() OVER (ORDER BY t.ctid))::int8 AS seq FROM {} AS t) AS s",
        quote_ident(select.table)
    );

    if let Some(filter) = select.filter {
        sql.push_str(&format!(" WHERE (s.r).{}::text = $1", quote_ident(filter.column)));
    }

    match select.order {
        RowOrder::Column(column, direction) => {
            sql.push_str(&format!(
                " ORDER BY (s.r).{} {} NULLS LAST, s.seq {}",
                quote_ident(column),
                direction.as_sql(),
                direction.as_sql()
            ));
        }
        RowOrder::Sequence(direction) => {
            sql.push_str(&format!(" ORDER BY s.seq {}", direction.as_sql()));
        }
    }

    if let Some(limit) = select.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    sql
}

impl RequestStore for PgRequestStore {
    fn list_tables(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn()?;
        let rows: Vec<NameRow> = diesel::sql_query(LIST_TABLES_SQL).load(&mut conn)?;
        Ok(rows.into_iter().map(|row| row.name).collect())
    }

    fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>> {
        let mut conn = self.conn()?;
        let rows: Vec<ColumnRow> = diesel::sql_query(TABLE_COLUMNS_SQL)
            .bind::<Text, _>(table)
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.name,
                data_type: row.data_type,
            })
            .collect())
    }

    fn select_rows(&self, select: &RowSelect<'_>) -> StoreResult<Vec<RawRow>> {
        let sql = build_select_sql(select);
        let mut conn = self.conn()?;

        let mut query = diesel::sql_query(sql).into_boxed::<Pg>();
        if let Some(filter) = select.filter {
            query = query.bind::<Text, _>(filter.value.to_string());
        }

        let rows: Vec<JsonRow> = query.load(&mut conn)?;
        rows.into_iter()
            .map(|row| {
                let values: Map<String, Value> = serde_json::from_str(&row.data)?;
                Ok(RawRow {
                    seq: row.seq,
                    values,
                })
            })
            .collect()
    }

    fn update_column(&self, update: &ColumnUpdate<'_>) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {} SET {} = $1 WHERE {}::text = $2",
            quote_ident(update.table),
            quote_ident(update.column),
            quote_ident(update.key_column)
        );
        let mut conn = self.conn()?;
        let updated = diesel::sql_query(sql)
            .bind::<Text, _>(update.value)
            .bind::<Text, _>(update.key)
            .execute(&mut conn)?;
        Ok(updated)
    }

    fn delete_all_rows(&self, table: &str) -> StoreResult<usize> {
        let sql = format!("DELETE FROM {}", quote_ident(table));
        let mut conn = self.conn()?;
        Ok(diesel::sql_query(sql).execute(&mut conn)?)
    }

    fn side_documents(&self, protocol: &str) -> StoreResult<Vec<SideDocument>> {
        let mut conn = self.conn()?;
        let rows = request_documents::table
            .filter(request_documents::protocol.eq(protocol))
            .order(request_documents::id.desc())
            .select(SideDocument::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn insert_side_document(&self, document: &NewSideDocument) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(request_documents::table)
            .values(document)
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Direction;

    #[test]
    fn full_scan_orders_by_physical_sequence() {
        let sql = build_select_sql(&RowSelect::all("requests_periodic"));
        assert_eq!(
            sql,
            "SELECT s.seq, row_to_json(s.r)::text AS data FROM \
             (SELECT t AS r, (row_number() OVER (ORDER BY t.ctid))::int8 AS seq \
             FROM \"requests_periodic\" AS t) AS s ORDER BY s.seq ASC"
        );
    }

    #[test]
    fn filtered_select_casts_column_to_text_and_limits() {
        let select = RowSelect::all("requests_admissional")
            .filter("cpf", "123")
            .order(RowOrder::Column("criado_em", Direction::Desc))
            .limit(1);
        let sql = build_select_sql(&select);
        assert!(sql.contains("AS t) AS s WHERE (s.r).\"cpf\"::text = $1"));
        assert!(sql.ends_with("ORDER BY (s.r).\"criado_em\" DESC NULLS LAST, s.seq DESC LIMIT 1"));
    }
}
