use std::str::FromStr;
use crate::analysis::network::NodeCategory;
use crate::errors::NodeInfoError;

const ID_PREFIX: &str = "ID:";
const LABEL_PREFIX: &str = "Label:";
const GROUP_PREFIX: &str = "Group:";
const LINE_BREAK: &str = "<br>";

/// The info blob attached to every rendered node, and the payload a
/// node click hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: String,
    pub label: String,
    pub group: NodeCategory,
}

impl NodeInfo {
    pub fn to_blob(&self) -> String {
        format!(
            "{} {}{}{} {}{}{} {}",
            ID_PREFIX, self.id, LINE_BREAK, LABEL_PREFIX, self.label, LINE_BREAK, GROUP_PREFIX, self.group
        )
    }

    pub fn parse(blob: &str) -> Result<Self, NodeInfoError> {
        let mut id = None;
        let mut label = None;
        let mut group = None;

        for field in blob.split(LINE_BREAK).flat_map(str::lines) {
            let field = field.trim();
            if let Some(value) = field.strip_prefix(ID_PREFIX) {
                id = Some(value.trim().to_string());
            } else if let Some(value) = field.strip_prefix(LABEL_PREFIX) {
                label = Some(value.trim().to_string());
            } else if let Some(value) = field.strip_prefix(GROUP_PREFIX) {
                let value = value.trim();
                group = Some(
                    NodeCategory::from_str(value)
                        .map_err(|_| NodeInfoError::UnknownGroup(value.to_string()))?,
                );
            }
        }

        let id = id
            .filter(|id| !id.is_empty())
            .ok_or(NodeInfoError::MissingField("ID"))?;

        Ok(NodeInfo {
            label: label.unwrap_or_else(|| id.clone()),
            group: group.ok_or(NodeInfoError::MissingField("Group"))?,
            id,
        })
    }
}

/// A click payload is either a full info blob or a bare node id.
pub fn node_id_from_click(payload: &str) -> Result<String, NodeInfoError> {
    if payload.contains(ID_PREFIX) {
        NodeInfo::parse(payload).map(|info| info.id)
    } else {
        let id = payload.trim();
        if id.is_empty() {
            Err(NodeInfoError::MissingField("ID"))
        } else {
            Ok(id.to_string())
        }
    }
}
