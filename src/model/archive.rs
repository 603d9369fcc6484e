//
// Copyright (c) 2020-2021 science+computing ag and other contributors
//
// This program and the accompanying materials are made
// available under the terms of the Eclipse Public License 2.0
// which is available at https://www.eclipse.org/legal/epl-2.0/
//
// SPDX-License-Identifier: EPL-2.0
//

//! Archive configuration: `{id, type, transfer_destination_id}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveApi {
    #[serde(rename = "rosetta-rest-api-v0")]
    RosettaRestV0,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfiguration {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ArchiveApi,
    #[serde(rename = "transferDestinationId")]
    pub transfer_destination_id: String,
}
