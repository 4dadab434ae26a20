// Activity log queries and mutations

use async_graphql::{Context, InputObject, Object, SimpleObject};

use super::reject;
use crate::engine::ActivityLogs;
use crate::models::{ActivityLog, ActivityLogDraft};

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "ActivityLog", rename_fields = "snake_case")]
pub struct ActivityLogGQL {
    pub id: i64,
    pub checkout_id: i64,
    pub address_id: i64,
    pub value: String,
    pub publisher_id: Option<i64>,
    pub territory_id: Option<i64>,
    pub timestamp: Option<i64>,
    pub notes: String,
}

impl From<&ActivityLog> for ActivityLogGQL {
    fn from(log: &ActivityLog) -> Self {
        Self {
            id: log.id,
            checkout_id: log.checkout_id,
            address_id: log.address_id,
            value: log.value.clone(),
            publisher_id: log.publisher_id,
            territory_id: log.territory_id,
            timestamp: log.timestamp,
            notes: log.notes.clone(),
        }
    }
}

/// Activity log fields sent by clients; requirements depend on the mutation
#[derive(InputObject, Debug, Clone, Default)]
#[graphql(name = "ActivityLogInput", rename_fields = "snake_case")]
pub struct ActivityLogInput {
    pub id: Option<i64>,
    pub checkout_id: Option<i64>,
    pub address_id: Option<i64>,
    pub value: Option<String>,
    pub publisher_id: Option<i64>,
    pub territory_id: Option<i64>,
    pub timestamp: Option<i64>,
    pub notes: Option<String>,
}

impl From<ActivityLogInput> for ActivityLogDraft {
    fn from(input: ActivityLogInput) -> Self {
        Self {
            id: input.id,
            checkout_id: input.checkout_id,
            address_id: input.address_id,
            value: input.value,
            publisher_id: input.publisher_id,
            territory_id: input.territory_id,
            timestamp: input.timestamp,
            notes: input.notes,
        }
    }
}

#[derive(Default)]
pub struct ActivityLogQuery;

#[Object]
impl ActivityLogQuery {
    /// Activity logs of a checkout, optionally narrowed to one address
    async fn activity_logs(
        &self,
        ctx: &Context<'_>,
        checkout_id: i64,
        address_id: Option<i64>,
    ) -> async_graphql::Result<Vec<ActivityLogGQL>> {
        let logs = ctx.data::<ActivityLogs>()?;
        match logs.read(checkout_id, address_id).await {
            Ok(rows) => Ok(rows.iter().map(ActivityLogGQL::from).collect()),
            Err(e) => Err(reject("activityLogs", e)),
        }
    }

    /// A single activity log by id; null when it does not exist
    async fn activity_log(
        &self,
        ctx: &Context<'_>,
        id: i64,
    ) -> async_graphql::Result<Option<ActivityLogGQL>> {
        let logs = ctx.data::<ActivityLogs>()?;
        match logs.read_one(id).await {
            Ok(row) => Ok(row.as_ref().map(ActivityLogGQL::from)),
            Err(e) => Err(reject("activityLog", e)),
        }
    }
}

#[derive(Default)]
pub struct ActivityLogMutation;

#[Object]
impl ActivityLogMutation {
    /// Record a visit; requires checkout_id, address_id and value
    async fn create_activity_log(
        &self,
        ctx: &Context<'_>,
        activity_log: ActivityLogInput,
    ) -> async_graphql::Result<Option<ActivityLogGQL>> {
        let logs = ctx.data::<ActivityLogs>()?;
        let id = logs
            .create(activity_log.into())
            .await
            .map_err(|e| reject("createActivityLog", e))?;
        let row = logs
            .read_one(id)
            .await
            .map_err(|e| reject("createActivityLog", e))?;
        Ok(row.as_ref().map(ActivityLogGQL::from))
    }

    /// Overwrite every field of an activity log; requires id as well
    async fn update_activity_log(
        &self,
        ctx: &Context<'_>,
        activity_log: ActivityLogInput,
    ) -> async_graphql::Result<Option<ActivityLogGQL>> {
        let logs = ctx.data::<ActivityLogs>()?;
        let draft: ActivityLogDraft = activity_log.into();
        let id = draft.id;
        logs.update(draft)
            .await
            .map_err(|e| reject("updateActivityLog", e))?;

        // update succeeded, so validation guaranteed an id
        let Some(id) = id else { return Ok(None) };
        let row = logs
            .read_one(id)
            .await
            .map_err(|e| reject("updateActivityLog", e))?;
        Ok(row.as_ref().map(ActivityLogGQL::from))
    }

    /// Remove an activity log; false when there was nothing to remove
    async fn delete_activity_log(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<bool> {
        let logs = ctx.data::<ActivityLogs>()?;
        match logs.delete(id).await {
            Ok(removed) => Ok(removed > 0),
            Err(e) => Err(reject("deleteActivityLog", e)),
        }
    }
}
