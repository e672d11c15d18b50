//! Interface de terminal do cvmatch: barras de progresso e saída colorida.
//!
//! Usa `indicatif` para uma barra por etapa e `console` para o relatório
//! final. O [`StageProgress`] implementa [`StageObserver`] e recebe o
//! progresso do coletor de cada lote.

use std::sync::Mutex;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::Progress;
use crate::pipeline::{MatchReport, ParseReport, Stage, StageObserver, StageReport};
use crate::timeline::TimelineFlags;

const BAR_TEMPLATE: &str = "{prefix:>11.cyan.bold} [{bar:40.cyan/blue}] {pos}/{len} {elapsed}";

/// Barra de progresso por etapa, com mensagens coloridas ao final de cada uma.
///
/// Sucesso em verde, falhas parciais em amarelo e rejeições em vermelho.
pub struct StageProgress {
    // Barra da etapa corrente; `None` entre etapas.
    bar: Mutex<Option<ProgressBar>>,
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
}

impl Default for StageProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl StageProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    fn new_bar(stage: Stage, total: usize) -> ProgressBar {
        let bar = ProgressBar::new(total as u64);
        // Template inválido cai no estilo padrão do indicatif.
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(stage.to_string());
        bar
    }
}

impl StageObserver for StageProgress {
    fn stage_started(&self, stage: Stage, total: usize) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        if let Some(previous) = slot.take() {
            previous.finish_and_clear();
        }
        *slot = Some(Self::new_bar(stage, total));
    }

    fn progress(&self, _stage: Stage, progress: Progress) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(progress.completed as u64);
            }
        }
    }

    /// Fecha a barra e imprime o resumo da etapa em stderr.
    fn stage_finished(&self, report: &StageReport) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        let failed = report.failed_count();
        let mark = if failed == 0 {
            self.green.apply_to("✓")
        } else {
            self.yellow.apply_to("!")
        };
        let mut line = format!(
            "  {mark} {:<11} {} item(s) in {:.1}s",
            report.stage.to_string(),
            report.items,
            report.elapsed.as_secs_f64()
        );
        if let Some(meta) = &report.meta {
            line.push_str(&format!(", peak in-flight {}", meta.peak_inflight));
        }
        if failed > 0 {
            line.push_str(&format!(", {}", self.yellow.apply_to(format!("{failed} failed"))));
        }
        if let Some(note) = &report.note {
            line.push_str(&format!(" {}", self.dim.apply_to(format!("({note})"))));
        }
        eprintln!("{line}");
    }
}

/// Imprime o relatório de matching: shortlist, demais aceitos e rejeitados.
pub fn print_match_report(report: &MatchReport) {
    let green = Style::new().green().bold();
    let yellow = Style::new().yellow();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    println!("{}", green.apply_to("─── Ranking ───"));
    for (position, ranked) in report.ranked.iter().enumerate() {
        let score = &ranked.score;
        let style = if ranked.degraded { &yellow } else { &green };
        println!(
            "{:>3}. {} {:.3} (base {:.3} × bonus {:.3} × exp {:.2})",
            position + 1,
            style.apply_to(score.id()),
            score.score_final(),
            score.score_base(),
            score.bonus_multiplier(),
            score.experience_coefficient()
        );
        if !ranked.scoring_comment.is_empty() {
            println!("     {}", dim.apply_to(&ranked.scoring_comment));
        }
        if !ranked.flags.is_empty() {
            println!(
                "     {}",
                yellow.apply_to(format!(
                    "{} gap(s), {} overlap(s)",
                    ranked.flags.gaps.len(),
                    ranked.flags.overlaps.len()
                ))
            );
        }
    }

    if !report.others.is_empty() {
        println!();
        println!("{}", dim.apply_to("─── Other accepted ───"));
        let offset = report.ranked.len();
        for (position, score) in report.others.iter().enumerate() {
            println!(
                "{:>3}. {} {:.3}",
                offset + position + 1,
                score.id(),
                score.score_final()
            );
        }
    }

    if !report.rejected.is_empty() {
        println!();
        println!("{}", red.apply_to("─── Rejected ───"));
        for rejection in &report.rejected {
            let marker = if rejection.failed { " [check failed]" } else { "" };
            println!(
                "  {}{marker}: {}",
                red.apply_to(&rejection.id),
                rejection.rationale
            );
        }
    }

    println!();
    println!(
        "{} accepted, {} rejected, {} degraded in {:.1}s",
        report.accepted_count(),
        report.rejected.len(),
        report.degraded_count(),
        report.elapsed.as_secs_f64()
    );
}

/// Resumo do parsing de CVs em stderr, com as falhas em vermelho.
///
/// O stdout fica livre para os perfis em JSON.
pub fn print_parse_summary(report: &ParseReport) {
    let green = Style::new().green().bold();
    let red = Style::new().red();
    eprintln!(
        "{} parsed, {} failed",
        green.apply_to(report.success_count()),
        report.outcomes.len() - report.success_count()
    );
    for failure in report.failures() {
        eprintln!("  {} {}", red.apply_to(&failure.item_id), failure.rationale);
    }
}

/// Imprime os sinais de linha do tempo de um candidato.
pub fn print_timeline(id: &str, flags: &TimelineFlags) {
    let style = if flags.is_empty() {
        Style::new().green()
    } else {
        Style::new().yellow()
    };
    println!("{}", style.apply_to(format!("── {id}")));
    for line in flags.format_for_prompt().lines() {
        println!("   {line}");
    }
}
