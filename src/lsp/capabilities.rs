//! Client capabilities declaration sent with `initialize`.
//!
//! Grounded 1:1 on `leta/lsp/capabilities.py::get_client_capabilities`;
//! every flag below has a matching line in that dict.

use lsp_types::{
    ClientCapabilities, CodeActionCapabilityResolveSupport, CodeActionClientCapabilities,
    CodeActionKind, CodeActionKindLiteralSupport, CodeActionLiteralSupport,
    DocumentSymbolClientCapabilities, DynamicRegistrationClientCapabilities, GeneralClientCapabilities,
    GotoCapability, HoverClientCapabilities, MarkupKind, PublishDiagnosticsClientCapabilities,
    RenameClientCapabilities, ResourceOperationKind, SymbolKind, SymbolKindCapability,
    TextDocumentClientCapabilities, TextDocumentSyncClientCapabilities,
    WorkspaceClientCapabilities, WorkspaceEditClientCapabilities,
    WorkspaceFileOperationsClientCapabilities, WorkspaceSymbolClientCapabilities,
};

/// All 26 LSP symbol kinds, `1..=26`, matching `list(range(1, 27))` upstream.
fn all_symbol_kinds() -> Vec<SymbolKind> {
    (1..=26).map(SymbolKind::from).collect()
}

#[must_use]
pub fn client_capabilities() -> ClientCapabilities {
    let symbol_kind = Some(SymbolKindCapability {
        value_set: Some(all_symbol_kinds()),
    });

    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                resource_operations: Some(vec![
                    ResourceOperationKind::Create,
                    ResourceOperationKind::Rename,
                    ResourceOperationKind::Delete,
                ]),
                failure_handling: None,
                normalizes_line_endings: None,
                change_annotation_support: None,
            }),
            symbol: Some(WorkspaceSymbolClientCapabilities {
                dynamic_registration: Some(false),
                symbol_kind: symbol_kind.clone(),
                tag_support: None,
                resolve_support: None,
            }),
            execute_command: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            file_operations: Some(WorkspaceFileOperationsClientCapabilities {
                dynamic_registration: Some(false),
                did_create: None,
                will_create: None,
                did_rename: Some(true),
                will_rename: Some(true),
                did_delete: None,
                will_delete: None,
            }),
            ..WorkspaceClientCapabilities::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                will_save: None,
                will_save_wait_until: None,
                did_save: Some(true),
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            declaration: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            type_definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            implementation: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                symbol_kind,
                hierarchical_document_symbol_support: Some(true),
                tag_support: None,
            }),
            code_action: Some(CodeActionClientCapabilities {
                dynamic_registration: Some(false),
                code_action_literal_support: Some(CodeActionLiteralSupport {
                    code_action_kind: CodeActionKindLiteralSupport {
                        value_set: vec![
                            CodeActionKind::EMPTY,
                            CodeActionKind::QUICKFIX,
                            CodeActionKind::REFACTOR,
                            CodeActionKind::REFACTOR_EXTRACT,
                            CodeActionKind::REFACTOR_INLINE,
                            CodeActionKind::REFACTOR_REWRITE,
                            CodeActionKind::SOURCE,
                            CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
                            CodeActionKind::SOURCE_FIX_ALL,
                        ],
                    },
                }),
                is_preferred_support: Some(true),
                disabled_support: None,
                data_support: None,
                resolve_support: Some(CodeActionCapabilityResolveSupport {
                    properties: vec!["edit".to_string()],
                }),
                honors_change_annotations: None,
            }),
            formatting: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            range_formatting: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(false),
                prepare_support: Some(true),
                prepare_support_default_behavior: None,
                honors_change_annotations: None,
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                tag_support: None,
                version_support: None,
                code_description_support: None,
                data_support: None,
            }),
            call_hierarchy: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            type_hierarchy: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            ..TextDocumentClientCapabilities::default()
        }),
        window: None,
        general: Some(GeneralClientCapabilities::default()),
        experimental: Some(serde_json::json!({
            "serverStatusNotification": true,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_hierarchical_document_symbols() {
        let caps = client_capabilities();
        assert!(
            caps.text_document
                .unwrap()
                .document_symbol
                .unwrap()
                .hierarchical_document_symbol_support
                .unwrap()
        );
    }

    #[test]
    fn declares_file_rename_operations() {
        let caps = client_capabilities();
        let file_ops = caps.workspace.unwrap().file_operations.unwrap();
        assert_eq!(file_ops.will_rename, Some(true));
        assert_eq!(file_ops.did_rename, Some(true));
    }

    #[test]
    fn symbol_kind_value_set_covers_1_through_26() {
        let caps = client_capabilities();
        let value_set = caps
            .text_document
            .unwrap()
            .document_symbol
            .unwrap()
            .symbol_kind
            .unwrap()
            .value_set
            .unwrap();
        assert_eq!(value_set.len(), 26);
    }
}
