//! Interface de linha de comando do cvmatch baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (match, parse,
//! timeline, config) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cvmatch: triagem de CVs com lotes LLM concorrentes e pontuação determinística.
#[derive(Debug, Parser)]
#[command(name = "cvmatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./cvmatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (logs em nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classifica candidatos contra uma vaga.
    Match {
        /// Arquivo JSON da vaga (título, descrição, critérios, embedding).
        #[arg(long)]
        job: PathBuf,

        /// Arquivo JSON com a lista de perfis de candidatos.
        #[arg(long)]
        candidates: PathBuf,

        /// Tamanho da shortlist re-ranqueada (sobrescreve `scoring.top_rerank`).
        #[arg(long)]
        top: Option<usize>,

        /// Emite o relatório em JSON no stdout.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Converte CVs em texto (.txt) de um diretório em perfis estruturados.
    Parse {
        /// Diretório com os CVs.
        dir: PathBuf,

        /// Arquivo de saída para os perfis em JSON (padrão: stdout).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Mostra lacunas e sobreposições na experiência de cada candidato.
    Timeline {
        /// Arquivo JSON com a lista de perfis de candidatos.
        #[arg(long)]
        candidates: PathBuf,
    },

    /// Mostra a configuração efetiva (com a chave mascarada).
    Config,
}
