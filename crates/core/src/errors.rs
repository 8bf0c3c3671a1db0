use thiserror::Error;

use crate::nodes::states::CallNode;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("quote references unknown part number {part_number}")]
    UnknownPart { part_number: String },
    #[error("node {node:?} is terminal and accepts no further turns")]
    TerminalNode { node: CallNode },
}

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;
    use crate::nodes::states::CallNode;

    #[test]
    fn errors_render_operator_readable_messages() {
        let error = DomainError::TerminalNode { node: CallNode::Confirmation };
        assert_eq!(
            error.to_string(),
            "node Confirmation is terminal and accepts no further turns"
        );

        let error = DomainError::UnknownPart { part_number: "ZZ-1".to_string() };
        assert!(error.to_string().contains("ZZ-1"));
    }
}
