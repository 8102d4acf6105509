//! Concrete action implementations (component C5). Each submodule groups
//! actions by the collaborator they drive: lifecycle actions shell out
//! over SSH against a [`crate::remote::target::RemoteTarget`], query
//! actions talk to a [`crate::client::GraphClient`], meta actions share
//! the retry-until-converged template in [`meta::MetaAction`], and
//! disturb actions implement [`crate::action::disturb::DisturbAction`].

pub mod disturb_actions;
pub mod lifecycle;
pub mod meta;
pub mod query;
