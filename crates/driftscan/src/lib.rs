//! driftscan - CloudFormation drift reconciliation for AWS accounts
//!
//! Finds resources that exist in an account but are neither declared by a
//! live CloudFormation stack nor excused by an exclusion rule, stacks whose
//! branch no longer exists, and Lambda packages bundled without handler code.

pub mod audit;
pub mod aws;
pub mod cache;
pub mod config;
pub mod github;
pub mod lambda_packages;
pub mod report;
pub mod resource_types;
pub mod scan;
pub mod submissions;
