//! Typed property sets for the CloudFormation resources the stacks declare.

pub mod ec2;
pub mod iam;
pub mod rds;
