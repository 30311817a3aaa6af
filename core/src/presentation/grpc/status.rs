// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Error → `tonic::Status` mapping, one function per gRPC service (§7,
//! §10.2).

use tonic::Status;

use crate::application::controller_service::ControllerError;
use crate::application::node_service::NodeError;

pub fn controller_status(err: ControllerError) -> Status {
    match err {
        ControllerError::InvalidArgument(m) => Status::invalid_argument(m),
        ControllerError::Unauthenticated(m) => Status::unauthenticated(m),
        ControllerError::PermissionDenied(m) => Status::permission_denied(m),
        ControllerError::NotFound(m) => Status::not_found(m),
        ControllerError::FailedPrecondition(m) => Status::failed_precondition(m),
        ControllerError::DeadlineExceeded(m) => Status::deadline_exceeded(m),
        ControllerError::Cancelled => Status::cancelled("operation cancelled"),
        ControllerError::Unimplemented(m) => Status::unimplemented(m),
        ControllerError::Internal(m) => Status::internal(m),
    }
}

pub fn node_status(err: NodeError) -> Status {
    match err {
        NodeError::InvalidArgument(m) => Status::invalid_argument(m),
        NodeError::NotFound(m) => Status::not_found(m),
        NodeError::DeadlineExceeded(m) => Status::deadline_exceeded(m),
        NodeError::Cancelled => Status::cancelled("operation cancelled"),
        NodeError::Internal(m) => Status::internal(m),
    }
}
