pub mod action;
pub mod bpjson;
pub mod cache;
pub mod cfg;
pub mod consistency;
pub mod country;
pub mod error;
pub mod features;
pub mod fetch;
pub mod logos;
pub mod plumbing;
pub mod producers;
pub mod reconcile;
pub mod report;
pub mod sources;
pub mod timestamp;
