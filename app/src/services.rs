use anyhow::Result;
use err_derive::Error;

/// A message a service can answer. `Resp` is what comes back.
pub trait Request {
    type Resp;
}

/// Read-only requests.
pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

/// Requests that load, change and save documents.
pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "{} not found", _0)]
pub struct NotFound(pub String);
