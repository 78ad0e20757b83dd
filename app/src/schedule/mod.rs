use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::*;
use r2d2::{self, Pool};
use serde::Serialize;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;

use crate::organization::Organization;
use crate::services::{Commandable, Queryable, Request};

mod matching;
mod models;

pub use self::matching::auto_match;
pub use self::models::{ScheduleEmployee, TeamMember};

#[derive(Debug)]
pub struct Roster<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddTeamMember {
    pub organization: Id<Organization>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowTeam {
    pub organization: Id<Organization>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchSchedule {
    pub organization: Id<Organization>,
    pub employees: Vec<ScheduleEmployee>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMatch {
    pub matched: BTreeMap<String, TeamMember>,
    pub unmatched: Vec<String>,
}

impl Request for AddTeamMember {
    type Resp = Id<TeamMember>;
}

impl Request for ShowTeam {
    type Resp = Vec<TeamMember>;
}

impl Request for MatchSchedule {
    type Resp = ScheduleMatch;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Roster<M> {
    pub fn new(db: Pool<M>) -> Result<Self> {
        let idgen = IdGen::new();
        Ok(Roster { db, idgen })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<AddTeamMember> for Roster<M>
{
    fn execute(&self, req: AddTeamMember) -> Result<Id<TeamMember>> {
        let mut member = TeamMember::new(
            self.idgen.generate(),
            req.organization,
            &req.first_name,
            &req.last_name,
        );
        member.email = req.email;
        member.roles = req.roles;

        self.db
            .get()?
            .save(&mut member)
            .with_context(|| format!("add team member {:?}", member.full_name()))?;
        info!("Added team member {} {:?}", member.id(), member.full_name());
        Ok(member.id())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ShowTeam> for Roster<M>
{
    fn query(&self, req: ShowTeam) -> Result<Vec<TeamMember>> {
        let mut team = self
            .db
            .get()?
            .list::<TeamMember>()?
            .into_iter()
            .filter(|m| m.organization == req.organization)
            .collect::<Vec<_>>();
        team.sort_by(|a, b| {
            a.last_name
                .to_lowercase()
                .cmp(&b.last_name.to_lowercase())
                .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
                .then(a.id().cmp(&b.id()))
        });
        Ok(team)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<MatchSchedule> for Roster<M>
{
    fn query(&self, req: MatchSchedule) -> Result<ScheduleMatch> {
        let team = self.query(ShowTeam {
            organization: req.organization,
        })?;
        let matched = auto_match(&req.employees, &team);
        let unmatched = req
            .employees
            .iter()
            .filter(|e| !matched.contains_key(&e.name))
            .map(|e| e.name.clone())
            .collect::<Vec<_>>();
        info!(
            "Matched {} of {} schedule names against {} team members",
            matched.len(),
            req.employees.len(),
            team.len()
        );
        if !unmatched.is_empty() {
            debug!("Unmatched: {:?}", unmatched);
        }
        Ok(ScheduleMatch { matched, unmatched })
    }
}
