// Address change-log queries

use async_graphql::{Context, Object, SimpleObject};

use super::reject;
use crate::engine::ChangeLogs;
use crate::models::change_log::format_date;
use crate::models::AddressChangeLog;

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "AddressChangeLog", rename_fields = "snake_case")]
pub struct AddressChangeLogGQL {
    pub id: i64,
    pub publisher_id: Option<i64>,
    /// `YYYY-MM-DD HH:MM:SS`
    pub date: String,
    pub table_name: String,
    pub record_id: i64,
    pub changes: String,
}

impl From<&AddressChangeLog> for AddressChangeLogGQL {
    fn from(entry: &AddressChangeLog) -> Self {
        Self {
            id: entry.id,
            publisher_id: entry.publisher_id,
            date: format_date(&entry.date),
            table_name: entry.table_name.clone(),
            record_id: entry.record_id,
            changes: entry.changes.clone(),
        }
    }
}

#[derive(Default)]
pub struct ChangeLogQuery;

#[Object]
impl ChangeLogQuery {
    /// Changes made to a congregation's addresses, oldest first
    async fn address_change_logs(
        &self,
        ctx: &Context<'_>,
        cong_id: i64,
        record_id: Option<i64>,
        min_date: Option<String>,
    ) -> async_graphql::Result<Vec<AddressChangeLogGQL>> {
        let change_logs = ctx.data::<ChangeLogs>()?;
        match change_logs
            .address_change_logs(Some(cong_id), record_id, min_date.as_deref())
            .await
        {
            Ok(entries) => Ok(entries.iter().map(AddressChangeLogGQL::from).collect()),
            Err(e) => Err(reject("addressChangeLogs", e)),
        }
    }
}
