// Group queries and mutations

use async_graphql::{Context, InputObject, Object, SimpleObject};

use super::reject;
use crate::engine::Groups;
use crate::models::{Group, GroupDraft};

#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "Group", rename_fields = "snake_case")]
pub struct GroupGQL {
    pub id: i64,
    pub congregation_id: i64,
    pub code: String,
    pub description: Option<String>,
    pub overseer: Option<i64>,
}

impl From<&Group> for GroupGQL {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id,
            congregation_id: group.congregation_id,
            code: group.code.clone(),
            description: group.description.clone(),
            overseer: group.overseer,
        }
    }
}

#[derive(InputObject, Debug, Clone, Default)]
#[graphql(name = "GroupInput", rename_fields = "snake_case")]
pub struct GroupInput {
    pub id: Option<i64>,
    pub congregation_id: Option<i64>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub overseer: Option<i64>,
}

impl From<GroupInput> for GroupDraft {
    fn from(input: GroupInput) -> Self {
        Self {
            id: input.id,
            congregation_id: input.congregation_id,
            code: input.code,
            description: input.description,
            overseer: input.overseer,
        }
    }
}

#[derive(Default)]
pub struct GroupQuery;

#[Object]
impl GroupQuery {
    /// A group by id, or by congregation id and group code
    async fn group(
        &self,
        ctx: &Context<'_>,
        id: Option<i64>,
        cong_id: Option<i64>,
        code: Option<String>,
    ) -> async_graphql::Result<Option<GroupGQL>> {
        let groups = ctx.data::<Groups>()?;
        match groups.get(id, cong_id, code).await {
            Ok(group) => Ok(group.as_ref().map(GroupGQL::from)),
            Err(e) => Err(reject("group", e)),
        }
    }

    /// Codes of every group in a congregation
    async fn group_codes(&self, ctx: &Context<'_>, cong_id: i64) -> async_graphql::Result<Vec<String>> {
        let groups = ctx.data::<Groups>()?;
        groups.codes(cong_id).await.map_err(|e| reject("groupCodes", e))
    }
}

#[derive(Default)]
pub struct GroupMutation;

#[Object]
impl GroupMutation {
    /// Create a group; requires code and congregation_id
    async fn create_group(
        &self,
        ctx: &Context<'_>,
        group: GroupInput,
    ) -> async_graphql::Result<Option<GroupGQL>> {
        let groups = ctx.data::<Groups>()?;
        let id = groups
            .create(group.into())
            .await
            .map_err(|e| reject("createGroup", e))?;
        let created = groups
            .get(Some(id), None, None)
            .await
            .map_err(|e| reject("createGroup", e))?;
        Ok(created.as_ref().map(GroupGQL::from))
    }

    /// Overwrite a group; requires id, code and congregation_id
    async fn update_group(
        &self,
        ctx: &Context<'_>,
        group: GroupInput,
    ) -> async_graphql::Result<Option<GroupGQL>> {
        let groups = ctx.data::<Groups>()?;
        let id = group.id;
        groups
            .update(group.into())
            .await
            .map_err(|e| reject("updateGroup", e))?;
        let updated = groups
            .get(id, None, None)
            .await
            .map_err(|e| reject("updateGroup", e))?;
        Ok(updated.as_ref().map(GroupGQL::from))
    }
}
