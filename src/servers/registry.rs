//! The static table of known language servers and lookup by language/file.
//!
//! Grounded 1:1 on `leta/servers/registry.py`: same `SERVERS` table (one
//! entry per language key, ordered by preference), same PATH extension,
//! same "first installed, falling back to the first entry" selection rule.

use std::path::Path;
use std::sync::OnceLock;

use crate::config::Config;
use crate::text::language_id;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: &'static str,
    pub command: &'static [&'static str],
    pub languages: &'static [&'static str],
    pub file_patterns: &'static [&'static str],
    pub install_cmd: Option<&'static str>,
    pub root_markers: &'static [&'static str],
}

macro_rules! server {
    (
        name: $name:expr,
        command: [$($cmd:expr),+ $(,)?],
        languages: [$($lang:expr),+ $(,)?],
        file_patterns: [$($pat:expr),+ $(,)?],
        $(install_cmd: $install:expr,)?
        root_markers: [$($marker:expr),* $(,)?] $(,)?
    ) => {
        ServerConfig {
            name: $name,
            command: &[$($cmd),+],
            languages: &[$($lang),+],
            file_patterns: &[$($pat),+],
            install_cmd: server!(@opt $($install)?),
            root_markers: &[$($marker),*],
        }
    };
    (@opt) => { None };
    (@opt $install:expr) => { Some($install) };
}

fn servers_table() -> &'static [(&'static str, &'static [ServerConfig])] {
    static TABLE: OnceLock<Vec<(&'static str, Vec<ServerConfig>)>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        vec![
            ("python", vec![
                server! {
                    name: "basedpyright",
                    command: ["basedpyright-langserver", "--stdio"],
                    languages: ["python"],
                    file_patterns: ["*.py", "*.pyi"],
                    install_cmd: "npm install -g @anthropic/basedpyright",
                    root_markers: ["pyproject.toml", "setup.py", "setup.cfg", "requirements.txt", "pyrightconfig.json"],
                },
                server! {
                    name: "pylsp",
                    command: ["pylsp"],
                    languages: ["python"],
                    file_patterns: ["*.py", "*.pyi"],
                    install_cmd: "pip install python-lsp-server",
                    root_markers: ["pyproject.toml", "setup.py", "setup.cfg"],
                },
                server! {
                    name: "ruff-lsp",
                    command: ["ruff-lsp"],
                    languages: ["python"],
                    file_patterns: ["*.py", "*.pyi"],
                    install_cmd: "pip install ruff-lsp",
                    root_markers: ["pyproject.toml", "ruff.toml"],
                },
            ]),
            ("rust", vec![server! {
                name: "rust-analyzer",
                command: ["rust-analyzer"],
                languages: ["rust"],
                file_patterns: ["*.rs"],
                install_cmd: "rustup component add rust-analyzer",
                root_markers: ["Cargo.toml"],
            }]),
            ("typescript", vec![server! {
                name: "typescript-language-server",
                command: ["typescript-language-server", "--stdio"],
                languages: ["typescript", "typescriptreact", "javascript", "javascriptreact"],
                file_patterns: ["*.ts", "*.tsx", "*.js", "*.jsx"],
                install_cmd: "npm install -g typescript-language-server typescript",
                root_markers: ["package.json", "tsconfig.json", "jsconfig.json"],
            }]),
            ("go", vec![server! {
                name: "gopls",
                command: ["gopls"],
                languages: ["go"],
                file_patterns: ["*.go"],
                install_cmd: "go install golang.org/x/tools/gopls@latest",
                root_markers: ["go.mod", "go.sum"],
            }]),
            ("c", vec![server! {
                name: "clangd",
                command: ["clangd"],
                languages: ["c", "cpp"],
                file_patterns: ["*.c", "*.h", "*.cpp", "*.hpp", "*.cc", "*.cxx"],
                install_cmd: "brew install llvm (macOS) or apt install clangd (Ubuntu)",
                root_markers: ["compile_commands.json", "CMakeLists.txt", "Makefile"],
            }]),
            ("java", vec![server! {
                name: "jdtls",
                command: ["jdtls"],
                languages: ["java"],
                file_patterns: ["*.java"],
                root_markers: ["pom.xml", "build.gradle", ".project"],
            }]),
            ("ruby", vec![server! {
                name: "solargraph",
                command: ["solargraph", "stdio"],
                languages: ["ruby"],
                file_patterns: ["*.rb", "*.rake", "Gemfile", "Rakefile"],
                install_cmd: "gem install solargraph",
                root_markers: ["Gemfile", ".ruby-version", "Rakefile"],
            }]),
            ("php", vec![server! {
                name: "intelephense",
                command: ["intelephense", "--stdio"],
                languages: ["php"],
                file_patterns: ["*.php", "*.phtml"],
                install_cmd: "npm install -g intelephense",
                root_markers: ["composer.json", "composer.lock", "index.php"],
            }]),
            ("elixir", vec![server! {
                name: "elixir-ls",
                command: ["elixir-ls"],
                languages: ["elixir"],
                file_patterns: ["*.ex", "*.exs"],
                root_markers: ["mix.exs"],
            }]),
            ("haskell", vec![server! {
                name: "haskell-language-server",
                command: ["haskell-language-server-wrapper", "--lsp"],
                languages: ["haskell"],
                file_patterns: ["*.hs"],
                install_cmd: "ghcup install hls",
                root_markers: ["*.cabal", "stack.yaml", "cabal.project"],
            }]),
            ("ocaml", vec![server! {
                name: "ocamllsp",
                command: ["ocamllsp"],
                languages: ["ocaml"],
                file_patterns: ["*.ml", "*.mli"],
                install_cmd: "opam install ocaml-lsp-server",
                root_markers: ["dune-project", "*.opam"],
            }]),
            ("lua", vec![server! {
                name: "lua-language-server",
                command: ["lua-language-server"],
                languages: ["lua"],
                file_patterns: ["*.lua"],
                install_cmd: "brew install lua-language-server",
                root_markers: [".luarc.json", ".luarc.jsonc"],
            }]),
            ("zig", vec![server! {
                name: "zls",
                command: ["zls"],
                languages: ["zig"],
                file_patterns: ["*.zig"],
                install_cmd: "brew install zls",
                root_markers: ["build.zig"],
            }]),
            ("yaml", vec![server! {
                name: "yaml-language-server",
                command: ["yaml-language-server", "--stdio"],
                languages: ["yaml"],
                file_patterns: ["*.yaml", "*.yml"],
                install_cmd: "npm install -g yaml-language-server",
                root_markers: [],
            }]),
            ("json", vec![server! {
                name: "vscode-json-languageserver",
                command: ["vscode-json-languageserver", "--stdio"],
                languages: ["json"],
                file_patterns: ["*.json"],
                install_cmd: "npm install -g vscode-langservers-extracted",
                root_markers: [],
            }]),
            ("html", vec![server! {
                name: "vscode-html-languageserver",
                command: ["vscode-html-language-server", "--stdio"],
                languages: ["html"],
                file_patterns: ["*.html", "*.htm"],
                install_cmd: "npm install -g vscode-langservers-extracted",
                root_markers: [],
            }]),
            ("css", vec![server! {
                name: "vscode-css-languageserver",
                command: ["vscode-css-language-server", "--stdio"],
                languages: ["css", "scss", "less"],
                file_patterns: ["*.css", "*.scss", "*.less"],
                install_cmd: "npm install -g vscode-langservers-extracted",
                root_markers: [],
            }]),
        ]
    });
    // Leak the inner Vec<ServerConfig> slices for 'static lifetime; the
    // table itself is built exactly once and lives for the process.
    static SLICES: OnceLock<Vec<(&'static str, &'static [ServerConfig])>> = OnceLock::new();
    SLICES.get_or_init(|| {
        table
            .iter()
            .map(|(key, servers)| (*key, servers.as_slice()))
            .collect()
    })
}

fn language_key(language_id: &str) -> Option<&'static str> {
    Some(match language_id {
        "python" => "python",
        "rust" => "rust",
        "typescript" | "typescriptreact" | "javascript" | "javascriptreact" => "typescript",
        "go" => "go",
        "c" | "cpp" => "c",
        "java" => "java",
        "ruby" => "ruby",
        "php" => "php",
        "elixir" => "elixir",
        "haskell" => "haskell",
        "ocaml" => "ocaml",
        "lua" => "lua",
        "zig" => "zig",
        "yaml" => "yaml",
        "json" => "json",
        "html" => "html",
        "css" | "scss" | "less" => "css",
        _ => return None,
    })
}

/// Extra PATH entries searched ahead of the inherited `PATH`, matching
/// `_get_extended_path`'s tool-install locations.
#[must_use]
pub fn extended_path() -> String {
    let home = std::env::var("HOME").unwrap_or_default();
    let extra = [
        format!("{home}/.gem/bin"),
        format!("{home}/go/bin"),
        format!("{home}/.cargo/bin"),
        format!("{home}/.local/bin"),
        "/usr/local/bin".to_string(),
        "/opt/homebrew/bin".to_string(),
    ];
    let current = std::env::var("PATH").unwrap_or_default();
    format!("{}:{}", extra.join(":"), current)
}

#[must_use]
pub fn is_server_installed(server: &ServerConfig) -> bool {
    let path_env = extended_path();
    which::which_in(server.command[0], Some(path_env), ".").is_ok()
}

#[must_use]
pub fn get_server_for_file(path: &Path, config: Option<&Config>) -> Option<&'static ServerConfig> {
    get_server_for_language(&language_id(path), config)
}

#[must_use]
pub fn get_server_for_language(language: &str, config: Option<&Config>) -> Option<&'static ServerConfig> {
    let key = language_key(language)?;
    let servers = servers_table().iter().find(|(k, _)| *k == key)?.1;
    if servers.is_empty() {
        return None;
    }

    let preferred = config
        .and_then(|c| c.servers.get(key))
        .and_then(|s| s.preferred.as_deref());

    if let Some(preferred) = preferred {
        if let Some(server) = servers
            .iter()
            .find(|s| s.name == preferred && is_server_installed(s))
        {
            return Some(server);
        }
    }

    servers
        .iter()
        .find(|s| is_server_installed(s))
        .or_else(|| servers.first())
}

#[must_use]
pub fn get_all_servers() -> Vec<&'static ServerConfig> {
    servers_table().iter().flat_map(|(_, servers)| servers.iter()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_typescript_variants_to_one_key() {
        for lang in ["typescript", "typescriptreact", "javascript", "javascriptreact"] {
            assert_eq!(language_key(lang), Some("typescript"));
        }
    }

    #[test]
    fn unknown_language_has_no_server() {
        assert!(get_server_for_language("brainfuck", None).is_none());
    }

    #[test]
    fn falls_back_to_first_entry_when_none_installed() {
        let server = get_server_for_language("python", None);
        assert_eq!(server.unwrap().name, "basedpyright");
    }

    #[test]
    fn get_all_servers_nonempty() {
        assert!(get_all_servers().len() >= 16);
    }
}
