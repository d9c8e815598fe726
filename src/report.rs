//! Plain-text and markdown renderings of analysis results

use std::fmt::Write;

use crate::churn::{PredictionReport, TrainingReport};
use crate::comparison::{Algorithm, ComparisonResult, Diagnostics};
use crate::emotion::EmotionAnalysis;
use crate::metrics::QualityMetrics;
use crate::outcome::AnalysisOutcome;
use crate::pipeline::{FullAnalysis, GrowthIntelligence};
use crate::segmentation::{Segment, SegmentationResult};

/// Markdown table of quality metrics, one row per algorithm
pub fn comparison_table(result: &ComparisonResult) -> String {
    let mut table = String::new();
    table.push_str(
        "| Algorithm | Silhouette ↑ | Davies-Bouldin ↓ | Calinski-Harabasz ↑ | Notes |\n",
    );
    table.push_str(
        "|-----------|--------------|-------------------|---------------------|-------|\n",
    );

    for entry in &result.models {
        let (sil, db, ch, note) = match &entry.outcome {
            AnalysisOutcome::Completed(model) => {
                let (sil, db, ch) = match &model.metrics {
                    QualityMetrics::Scored {
                        silhouette_score,
                        davies_bouldin_score,
                        calinski_harabasz_score,
                    } => (
                        format!("{:.3}", silhouette_score),
                        format!("{:.3}", davies_bouldin_score),
                        format!("{:.1}", calinski_harabasz_score),
                    ),
                    QualityMetrics::InsufficientClusters { .. } => {
                        ("N/A".to_string(), "N/A".to_string(), "N/A".to_string())
                    }
                };
                let note = match (&model.diagnostics, entry.algorithm) {
                    (Diagnostics::Dbscan { n_clusters_found, .. }, _) => {
                        format!("Found {} clusters", n_clusters_found)
                    }
                    (_, Algorithm::KMeans) => "Primary algorithm".to_string(),
                    (_, Algorithm::GaussianMixture) => "Soft clustering".to_string(),
                    _ => String::new(),
                };
                (sil, db, ch, note)
            }
            AnalysisOutcome::Unavailable { reason, .. } => (
                "N/A".to_string(),
                "N/A".to_string(),
                "N/A".to_string(),
                format!("Unavailable: {}", reason),
            ),
        };
        let _ = writeln!(
            table,
            "| {} | {} | {} | {} | {} |",
            entry.algorithm.display_name(),
            sil,
            db,
            ch,
            note
        );
    }

    table
}

pub fn segmentation_summary(result: &SegmentationResult) -> String {
    let mut out = String::new();
    let total = result.segment_counts.total();
    let _ = writeln!(out, "=== Listener Segments ===");
    for segment in Segment::ALL {
        let count = result.segment_counts.get(segment);
        let _ = writeln!(
            out,
            "{}: {} listeners ({:.1}%)",
            segment,
            count,
            result.segment_counts.fraction(segment) * 100.0
        );
    }
    let _ = writeln!(out, "Total: {}", total);

    match result.silhouette_score {
        Some(score) => {
            let _ = writeln!(out, "\nSilhouette score: {:.3}", score);
        }
        None => {
            let _ = writeln!(out, "\nSilhouette score: N/A (fewer than 2 clusters)");
        }
    }
    let _ = writeln!(out, "Within-cluster sum of squares: {:.2}", result.inertia);

    let _ = writeln!(out, "\n=== Cluster Statistics ===");
    for stats in &result.cluster_stats {
        let _ = writeln!(
            out,
            "Cluster {} ({}): {} listeners, engagement {:.2}, loyalty {:.2}, streams {:.1}",
            stats.cluster,
            stats.segment,
            stats.count,
            stats.engagement_score,
            stats.loyalty_score,
            stats.total_streams
        );
    }

    let _ = writeln!(out, "\n=== Key Insights ===");
    for line in result.insights.lines() {
        let _ = writeln!(out, "- {}", line);
    }
    out
}

pub fn training_summary(report: &TrainingReport) -> String {
    let mut out = String::new();
    let m = &report.metrics;
    let _ = writeln!(out, "=== Churn Model ({}) ===", report.artist_id);
    let _ = writeln!(
        out,
        "Listeners: {} ({} churned, {})",
        report.dataset_info.total_listeners,
        report.dataset_info.churned_listeners,
        report.dataset_info.churn_rate
    );
    let _ = writeln!(out, "Train accuracy: {:.3}", m.train_accuracy);
    let _ = writeln!(out, "Test accuracy: {:.3}", m.test_accuracy);
    let _ = writeln!(
        out,
        "Cross-validation: {:.3} ± {:.3}",
        m.cv_mean_accuracy, m.cv_std_accuracy
    );
    match m.roc_auc_score {
        Some(auc) => {
            let _ = writeln!(out, "ROC-AUC: {:.3}", auc);
        }
        None => {
            let _ = writeln!(out, "ROC-AUC: N/A (single-class holdout)");
        }
    }
    let _ = writeln!(out, "\nFeature importance:");
    for fi in &report.feature_importance {
        let _ = writeln!(out, "  {:<24} {:.3}", fi.feature, fi.importance);
    }
    out
}

pub fn churn_summary(report: &PredictionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Churn Risk ({}) ===", report.artist_id);
    for (label, band) in [
        ("High", &report.high_risk),
        ("Medium", &report.medium_risk),
        ("Low", &report.low_risk),
    ] {
        let _ = writeln!(out, "{:<6} risk: {} ({:.1}%)", label, band.count, band.percentage);
    }

    if !report.top_high_risk.is_empty() {
        let _ = writeln!(out, "\nHighest risk listeners:");
        for listener in &report.top_high_risk {
            let _ = writeln!(
                out,
                "  {} {:.2} ({} days inactive)",
                listener.listener_id, listener.churn_risk_score, listener.days_since_last_activity
            );
        }
    }

    for strategy in &report.recommendations {
        let _ = writeln!(
            out,
            "\n[{:?}] {}: {}",
            strategy.priority, strategy.target, strategy.action
        );
        for tactic in &strategy.tactics {
            let _ = writeln!(out, "  - {}", tactic);
        }
    }
    out
}

pub fn emotion_summary(analysis: &EmotionAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Emotions ({} texts) ===", analysis.total_analyzed);
    for (emotion, stat) in &analysis.distribution {
        let _ = writeln!(
            out,
            "{:<9} {:>5.1}%  intensity {:.3}",
            emotion, stat.percentage, stat.average_intensity
        );
    }
    match &analysis.dominant_emotion {
        Some(d) => {
            let _ = writeln!(out, "Dominant: {} ({:.1}%)", d.emotion, d.percentage);
        }
        None => {
            let _ = writeln!(out, "Dominant: none");
        }
    }
    let _ = writeln!(
        out,
        "Sentiment: {} positive / {} neutral / {} negative",
        analysis.sentiment.positive, analysis.sentiment.neutral, analysis.sentiment.negative
    );
    for insight in &analysis.insights {
        let _ = writeln!(out, "- {} -> {}", insight.message, insight.action);
    }
    out
}

fn section<T>(
    out: &mut String,
    title: &str,
    outcome: &AnalysisOutcome<T>,
    render: impl Fn(&T) -> String,
) {
    let _ = writeln!(out, "## {}\n", title);
    match outcome {
        AnalysisOutcome::Completed(value) => out.push_str(&render(value)),
        AnalysisOutcome::Unavailable { kind, reason } => {
            let _ = writeln!(out, "Unavailable ({}): {}", kind, reason);
        }
    }
    out.push('\n');
}

pub fn full_report(report: &FullAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Full analysis for {} ({})\n",
        report.artist_id,
        report.generated_at.format("%Y-%m-%d %H:%M")
    );
    section(&mut out, "Clustering comparison", &report.clustering, comparison_table);
    section(&mut out, "Emotions", &report.emotions, emotion_summary);
    section(&mut out, "Churn risk", &report.churn, churn_summary);
    out
}

pub fn growth_report(report: &GrowthIntelligence) -> String {
    let mut out = String::new();
    let ctx = &report.artist_context;
    let _ = writeln!(
        out,
        "# Growth intelligence for {} ({}, {} days, {} stage)\n",
        ctx.artist_name, ctx.genre, ctx.days_active, ctx.stage
    );

    section(&mut out, "Audience segments", &report.audience_segments, |s| {
        let mut text = comparison_table(&s.comparison);
        let _ = writeln!(
            text,
            "\nPrimary segment: {} (superfan ratio {:.1}%)\n{}",
            s.primary_segment,
            s.superfan_ratio * 100.0,
            s.recommendation
        );
        text
    });
    section(&mut out, "Supporter retention", &report.retention, |r| {
        let mut text = format!(
            "Current risk {:.2} ({:?}), overall health {:?}, {} at-risk periods\n",
            r.retention.current_risk_level,
            r.retention.risk_status,
            r.retention.overall_health,
            r.retention.at_risk_periods
        );
        for rec in &r.recommendations {
            let _ = writeln!(text, "- [{:?}] {}", rec.priority, rec.title);
        }
        text
    });
    section(&mut out, "Emotional journey", &report.emotions, |e| {
        let mut text = emotion_summary(&e.analysis);
        let _ = writeln!(
            text,
            "Motivation: {:?}, stage appropriate: {}",
            e.journey.motivation_level, e.journey.stage_appropriate
        );
        for tip in &e.journey.motivation_tips {
            let _ = writeln!(text, "  * {}", tip);
        }
        text
    });

    for insight in &report.unified_insights {
        let _ = writeln!(out, "**{}**: {}", insight.title, insight.message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{ClusterModelResult, ModelEntry};

    fn result() -> ComparisonResult {
        let kmeans = ClusterModelResult {
            algorithm: Algorithm::KMeans,
            name: Algorithm::KMeans.display_name().to_string(),
            labels: vec![Some(0), Some(1)],
            diagnostics: Diagnostics::KMeans {
                centers: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
                inertia: 0.5,
            },
            metrics: QualityMetrics::Scored {
                silhouette_score: 0.61234,
                davies_bouldin_score: 0.5,
                calinski_harabasz_score: 120.04,
            },
        };
        let dbscan = ClusterModelResult {
            algorithm: Algorithm::Dbscan,
            name: Algorithm::Dbscan.display_name().to_string(),
            labels: vec![None, None],
            diagnostics: Diagnostics::Dbscan {
                n_clusters_found: 0,
                n_noise_points: 2,
                core_samples: Vec::new(),
            },
            metrics: QualityMetrics::InsufficientClusters {
                note: "Less than 2 clusters found".into(),
            },
        };
        ComparisonResult {
            n_listeners: 2,
            listener_ids: vec!["l1".into(), "l2".into()],
            models: vec![
                ModelEntry {
                    algorithm: Algorithm::KMeans,
                    outcome: AnalysisOutcome::Completed(kmeans),
                },
                ModelEntry {
                    algorithm: Algorithm::GaussianMixture,
                    outcome: AnalysisOutcome::unavailable("clustering", "singular covariance"),
                },
                ModelEntry {
                    algorithm: Algorithm::Dbscan,
                    outcome: AnalysisOutcome::Completed(dbscan),
                },
            ],
            best_model: None,
            primary_algorithm: Algorithm::KMeans,
        }
    }

    #[test]
    fn test_comparison_table_rows() {
        let table = comparison_table(&result());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("| Algorithm | Silhouette ↑"));
        assert_eq!(
            lines[2],
            "| K-Means (Primary) | 0.612 | 0.500 | 120.0 | Primary algorithm |"
        );
        assert!(lines[3].contains("Unavailable: singular covariance"));
        assert_eq!(
            lines[4],
            "| DBSCAN (Density-Based) | N/A | N/A | N/A | Found 0 clusters |"
        );
    }
}
