use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use thicket_io::{FeatureCsvReader, LabeledCsvReader, LabeledDataset};
use thicket_learn::{
    Average, AveragedMetrics, Bagging, ClassMetrics, ConfusionMatrix, DecisionTree,
    DecisionTreeConfig, DistanceMetric, KMeans, Knn, MaxFeatures, Model, RandomForest,
    RandomForestConfig, train_validation_split,
};

#[derive(Parser)]
#[command(name = "thicket")]
#[command(about = "Decision trees, bagging, random forests and k-means for CSV data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel prediction (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Model selection and hyperparameters shared by every subcommand.
#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// Learner: "forest", "tree", "bagged-tree", or "knn"
    #[arg(long, default_value = "forest")]
    model: String,

    /// Number of trees (forest) or bags (bagged-tree)
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Maximum tree depth
    #[arg(long, default_value_t = 100)]
    max_depth: usize,

    /// Grow trees without a depth limit (overrides --max-depth)
    #[arg(long, default_value_t = false)]
    unlimited_depth: bool,

    /// Minimum samples a node needs before it may split
    #[arg(long, default_value_t = 2)]
    min_samples_split: usize,

    /// Features tried per split: "all", "sqrt", "log2", or a count
    /// (default: sqrt for forest, all otherwise)
    #[arg(long)]
    max_features: Option<String>,

    /// Fraction of training rows drawn per bag
    #[arg(long, default_value_t = 1.0)]
    sample_fraction: f64,

    /// Worker pool size for bagged-tree (defaults to one per bag)
    #[arg(long)]
    workers: Option<usize>,

    /// Neighbour count for knn
    #[arg(long, default_value_t = 5)]
    k: usize,

    /// Distance metric for knn: "euclidean" or "manhattan"
    #[arg(long, default_value = "euclidean")]
    metric: String,
}

#[derive(Subcommand)]
enum Command {
    /// Train on part of a labeled CSV file and score the held-out rows
    Evaluate {
        /// Path to the labeled CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the label column (defaults to the last column)
        #[arg(long)]
        label_column: Option<String>,

        /// Fraction of rows held out for validation
        #[arg(long, default_value_t = 0.2)]
        validation_ratio: f64,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Train on a labeled CSV file and predict labels for another
    Predict {
        /// Path to the labeled training CSV file
        #[arg(long)]
        train: PathBuf,

        /// Path to the CSV file of rows to label
        #[arg(long)]
        input: PathBuf,

        /// Name of the label column (defaults to the last column)
        #[arg(long)]
        label_column: Option<String>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Group the rows of a CSV file into k clusters
    Cluster {
        /// Path to the CSV file
        #[arg(long)]
        data: PathBuf,

        /// Column to leave out, such as a label column
        #[arg(long)]
        skip_column: Option<String>,

        /// Number of clusters
        #[arg(long, default_value_t = 3)]
        clusters: usize,

        /// Maximum iterations per restart
        #[arg(long, default_value_t = 100)]
        max_iter: usize,

        /// Number of seeded restarts
        #[arg(long, default_value_t = 10)]
        n_init: usize,

        /// Stop once no centroid moves farther than this
        #[arg(long, default_value_t = 1e-4)]
        tolerance: f64,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct EvaluateOutput {
    model: String,
    n_samples: usize,
    n_features: usize,
    n_train: usize,
    n_validation: usize,
    accuracy: f64,
    macro_average: AveragedMetrics,
    micro_average: AveragedMetrics,
    weighted_average: AveragedMetrics,
    classes: Vec<usize>,
    confusion_matrix: Vec<Vec<usize>>,
    class_metrics: Vec<ClassMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ensemble: Option<EnsembleSummary>,
}

#[derive(Serialize)]
struct PredictOutput {
    model: String,
    n_train: usize,
    n_predictions: usize,
    predictions: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ensemble: Option<EnsembleSummary>,
}

#[derive(Serialize)]
struct ClusterOutput {
    n_samples: usize,
    n_features: usize,
    k: usize,
    inertia: f64,
    iterations: usize,
    converged: bool,
    cluster_sizes: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    assignments: Vec<usize>,
}

#[derive(Serialize)]
struct EnsembleSummary {
    n_learners: usize,
    n_failed: usize,
    oob_accuracy: Option<f64>,
}

/// The learner chosen on the command line.
enum Classifier {
    Forest(RandomForest),
    Tree(DecisionTree),
    BaggedTree(Bagging),
    Knn(Knn),
}

impl Classifier {
    fn model(&self) -> &dyn Model {
        match self {
            Classifier::Forest(m) => m,
            Classifier::Tree(m) => m,
            Classifier::BaggedTree(m) => m,
            Classifier::Knn(m) => m,
        }
    }

    fn model_mut(&mut self) -> &mut dyn Model {
        match self {
            Classifier::Forest(m) => m,
            Classifier::Tree(m) => m,
            Classifier::BaggedTree(m) => m,
            Classifier::Knn(m) => m,
        }
    }

    /// Learner counts and out-of-bag accuracy for the ensemble learners.
    fn ensemble_summary(&self, features: &[Vec<f64>], labels: &[usize]) -> Option<EnsembleSummary> {
        let bagging = match self {
            Classifier::Forest(forest) => forest.bagging(),
            Classifier::BaggedTree(bagging) => bagging,
            Classifier::Tree(_) | Classifier::Knn(_) => return None,
        };
        Some(EnsembleSummary {
            n_learners: bagging.learners().len(),
            n_failed: bagging.failures().len(),
            oob_accuracy: bagging.oob_score(features, labels).ok().map(|s| s.accuracy),
        })
    }
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "all" => Ok(MaxFeatures::All),
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        other => other
            .parse::<usize>()
            .map(MaxFeatures::Fixed)
            .with_context(|| format!("unknown max features: {other} (expected all, sqrt, log2, or a count)")),
    }
}

fn parse_metric(s: &str) -> Result<DistanceMetric> {
    match s {
        "euclidean" => Ok(DistanceMetric::Euclidean),
        "manhattan" => Ok(DistanceMetric::Manhattan),
        other => anyhow::bail!("unknown metric: {other} (expected euclidean or manhattan)"),
    }
}

fn tree_config(args: &ModelArgs, default_max_features: MaxFeatures, seed: u64) -> Result<DecisionTreeConfig> {
    let max_features = match &args.max_features {
        Some(s) => parse_max_features(s)?,
        None => default_max_features,
    };
    let max_depth = (!args.unlimited_depth).then_some(args.max_depth);
    Ok(DecisionTreeConfig::new()
        .with_min_samples_split(args.min_samples_split)
        .with_max_depth(max_depth)
        .with_max_features(max_features)
        .with_seed(seed))
}

fn build_classifier(args: &ModelArgs, seed: u64) -> Result<Classifier> {
    let classifier = match args.model.as_str() {
        "forest" => {
            let tree = tree_config(args, MaxFeatures::Sqrt, seed)?;
            let config = RandomForestConfig::new(args.n_trees)?
                .with_min_samples_split(tree.min_samples_split())
                .with_max_depth(tree.max_depth())
                .with_max_features(tree.max_features())
                .with_sample_fraction(args.sample_fraction)
                .with_seed(seed);
            Classifier::Forest(RandomForest::new(config)?)
        }
        "tree" => Classifier::Tree(tree_config(args, MaxFeatures::All, seed)?.build()),
        "bagged-tree" => {
            let prototype = tree_config(args, MaxFeatures::All, seed)?.build();
            let mut bagging = Bagging::new(Box::new(prototype), args.n_trees)?
                .with_sample_fraction(args.sample_fraction)
                .with_seed(seed);
            if let Some(workers) = args.workers {
                bagging = bagging.with_workers(workers);
            }
            Classifier::BaggedTree(bagging)
        }
        "knn" => Classifier::Knn(Knn::new(args.k)?.with_metric(parse_metric(&args.metric)?)),
        other => anyhow::bail!("unknown model: {other} (expected forest, tree, bagged-tree, or knn)"),
    };
    Ok(classifier)
}

fn read_labeled(path: &Path, label_column: Option<&str>) -> Result<LabeledDataset> {
    let mut reader = LabeledCsvReader::new(path);
    if let Some(name) = label_column {
        reader = reader.with_label_column(name);
    }
    reader
        .read()
        .with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Evaluate {
            data,
            label_column,
            validation_ratio,
            model,
        } => {
            let dataset = read_labeled(&data, label_column.as_deref())?;
            let n_samples = dataset.n_samples();
            let n_features = dataset.n_features();
            let (features, labels) = dataset.into_parts();

            let split = train_validation_split(&features, &labels, validation_ratio, cli.seed)
                .context("failed to split dataset")?;
            if split.validation_features.is_empty() {
                anyhow::bail!(
                    "validation ratio {validation_ratio} leaves no rows to evaluate on {n_samples} samples"
                );
            }

            let mut classifier = build_classifier(&model, cli.seed)?;
            classifier
                .model_mut()
                .fit(&split.train_features, &split.train_labels)
                .context("training failed")?;
            let predicted = classifier
                .model()
                .predict(&split.validation_features)
                .context("prediction failed")?;

            // Dense slots per observed label, however large the label values.
            let cm = ConfusionMatrix::from_observed_labels(&split.validation_labels, &predicted)
                .context("failed to build confusion matrix")?;
            debug!("validation metrics\n{}", cm.summary(Average::Weighted));
            info!(accuracy = cm.accuracy(), "evaluation complete");

            let output = EvaluateOutput {
                model: classifier.model().name().to_string(),
                n_samples,
                n_features,
                n_train: split.train_features.len(),
                n_validation: split.validation_features.len(),
                accuracy: cm.accuracy(),
                macro_average: cm.macro_average(),
                micro_average: cm.micro_average(),
                weighted_average: cm.weighted_average(),
                classes: cm.classes().to_vec(),
                confusion_matrix: cm.as_rows().to_vec(),
                class_metrics: cm.class_metrics(),
                ensemble: classifier.ensemble_summary(&split.train_features, &split.train_labels),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            train,
            input,
            label_column,
            model,
        } => {
            let dataset = read_labeled(&train, label_column.as_deref())?;
            let label_name = dataset.label_name().to_string();
            let (features, labels) = dataset.into_parts();

            let queries = FeatureCsvReader::new(&input)
                .with_skipped_column(label_name)
                .read()
                .with_context(|| format!("failed to read {}", input.display()))?;

            let mut classifier = build_classifier(&model, cli.seed)?;
            classifier
                .model_mut()
                .fit(&features, &labels)
                .context("training failed")?;
            let predictions = classifier
                .model()
                .predict(queries.features())
                .context("prediction failed")?;
            info!(n_predictions = predictions.len(), "prediction complete");

            let output = PredictOutput {
                model: classifier.model().name().to_string(),
                n_train: features.len(),
                n_predictions: predictions.len(),
                predictions,
                ensemble: classifier.ensemble_summary(&features, &labels),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Cluster {
            data,
            skip_column,
            clusters,
            max_iter,
            n_init,
            tolerance,
        } => {
            let mut reader = FeatureCsvReader::new(&data);
            if let Some(name) = skip_column {
                reader = reader.with_skipped_column(name);
            }
            let dataset = reader
                .read()
                .with_context(|| format!("failed to read {}", data.display()))?;
            let n_features = dataset.feature_names().len();
            let features = dataset.into_features();

            let mut kmeans = KMeans::new(clusters)?
                .with_max_iter(max_iter)
                .with_n_init(n_init)
                .with_tolerance(tolerance)
                .with_seed(cli.seed);
            let assignments = kmeans
                .fit_predict(&features)
                .context("clustering failed")?;
            let inertia = kmeans.inertia().unwrap_or_default();
            info!(k = clusters, inertia, "clustering complete");

            let output = ClusterOutput {
                n_samples: features.len(),
                n_features,
                k: clusters,
                inertia,
                iterations: kmeans.iterations(),
                converged: kmeans.converged(),
                cluster_sizes: kmeans.cluster_sizes(),
                centroids: kmeans.centroids().to_vec(),
                assignments,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
