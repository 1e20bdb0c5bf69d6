//! The breadth-first walk, version selection and the walked graph.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use honesty_cache::{Cache, DEFAULT_PARALLELISM};
use honesty_packaging::{EnvironmentMarkers, Marker, Requirement, SpecifierSet, Version};
use honesty_releases::{FileType, Package, ReleaseError, parse_index};

use crate::error::ResolveError;
use crate::metadata::{read_metadata_remote_wheel, read_metadata_sdist, read_metadata_wheel};

/// Wheels above this size are introspected remotely via range requests
/// instead of being downloaded into the cache.
const REMOTE_READ_THRESHOLD: u64 = 20_000_000;

/// Where the walker gets parsed packages from. The production source goes
/// through the index cache; tests substitute fixtures.
#[async_trait]
pub trait PackageSource: Send + Sync {
    async fn parse_index(&self, pkg: &str) -> Result<Package, ReleaseError>;
}

/// [`PackageSource`] backed by the shared cache.
pub struct IndexSource {
    cache: Cache,
    use_json: bool,
}

impl IndexSource {
    pub fn new(cache: Cache, use_json: bool) -> Self {
        IndexSource { cache, use_json }
    }
}

#[async_trait]
impl PackageSource for IndexSource {
    async fn parse_index(&self, pkg: &str) -> Result<Package, ReleaseError> {
        parse_index(pkg, &self.cache, self.use_json, false).await
    }
}

/// Installed-version oracle: canonical name → version string, for "I
/// already have this installed" preferences.
pub type CurrentVersionsFn = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Identity of a node in the walked graph.
///
/// The extras are part of the key: `pkg` and `pkg[test]` resolve the same
/// version but carry different transitive edges. `None` marks a version
/// the index does not know about (a non-public installed version).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub name: String,
    pub version: Version,
    pub extras: Option<Vec<String>>,
}

impl NodeKey {
    fn synthetic_root() -> Self {
        NodeKey {
            name: String::new(),
            version: Version::parse("0").expect("constant version parses"),
            extras: None,
        }
    }
}

/// A resolved (package, version) in the graph. Revisiting a key does not
/// re-walk it: `done` flips once its requirements have been enqueued.
#[derive(Debug, Clone)]
pub struct DepNode {
    pub name: String,
    pub version: Version,
    pub deps: Vec<DepEdge>,
    /// `None` when the version is non-public (not in the index).
    pub has_sdist: Option<bool>,
    pub has_bdist: Option<bool>,
    pub dep_extras: Option<BTreeSet<String>>,
    pub done: bool,
}

/// An edge, labelled with the originating specifier and marker.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub target: NodeKey,
    pub constraints: Option<String>,
    pub markers: Option<Marker>,
}

/// The finished walk.
#[derive(Debug)]
pub struct DepWalk {
    pub nodes: HashMap<NodeKey, DepNode>,
    pub root: NodeKey,
    /// Canonical names that were demanded at more than one version.
    pub known_conflicts: BTreeSet<String>,
}

impl DepWalk {
    pub fn root_node(&self) -> &DepNode {
        &self.nodes[&self.root]
    }

    pub fn node(&self, key: &NodeKey) -> &DepNode {
        &self.nodes[key]
    }
}

enum PackageFetch {
    Pending(JoinHandle<Result<Package, ReleaseError>>),
    Ready(Arc<Package>),
}

struct QueueItem {
    parent: Option<NodeKey>,
    requirement: Requirement,
}

/// The walker. One walk per instance; state is consumed by [`DepWalker::walk`].
pub struct DepWalker {
    cache: Cache,
    source: Arc<dyn PackageSource>,
    env: EnvironmentMarkers,
    python_version: Version,
    trim_newer: Option<DateTime<Utc>>,
    pool: Arc<Semaphore>,

    queue: VecDeque<QueueItem>,
    fetches: HashMap<String, PackageFetch>,
    nodes: HashMap<NodeKey, DepNode>,
    already_chosen: HashMap<String, Version>,
    known_conflicts: BTreeSet<String>,
}

impl DepWalker {
    pub fn new(
        cache: Cache,
        source: Arc<dyn PackageSource>,
        python_version: &str,
        sys_platform: Option<&str>,
        trim_newer: Option<DateTime<Utc>>,
    ) -> Result<Self, ResolveError> {
        Self::with_parallelism(
            cache,
            source,
            python_version,
            sys_platform,
            trim_newer,
            DEFAULT_PARALLELISM,
        )
    }

    pub fn with_parallelism(
        cache: Cache,
        source: Arc<dyn PackageSource>,
        python_version: &str,
        sys_platform: Option<&str>,
        trim_newer: Option<DateTime<Utc>>,
        parallelism: usize,
    ) -> Result<Self, ResolveError> {
        let env = EnvironmentMarkers::new(python_version, sys_platform)?;
        let python_version = Version::parse(python_version)?;
        Ok(DepWalker {
            cache,
            source,
            env,
            python_version,
            trim_newer,
            pool: Arc::new(Semaphore::new(parallelism.max(1))),
            queue: VecDeque::new(),
            fetches: HashMap::new(),
            nodes: HashMap::new(),
            already_chosen: HashMap::new(),
            known_conflicts: BTreeSet::new(),
        })
    }

    /// Walk the graph rooted at `roots` (requirement strings).
    ///
    /// `include_extras` enqueues extra-gated dependencies unconditionally;
    /// otherwise an extra-gated dependency is followed only when the parent
    /// edge asked for that extra. `current_versions` lets the caller prefer
    /// already-installed versions, including non-public ones.
    pub async fn walk(
        mut self,
        roots: &[String],
        include_extras: bool,
        current_versions: Option<CurrentVersionsFn>,
    ) -> Result<DepWalk, ResolveError> {
        let current_versions = current_versions.unwrap_or_else(|| Box::new(|_| None));

        let root_key = NodeKey::synthetic_root();
        self.nodes.insert(
            root_key.clone(),
            DepNode {
                name: String::new(),
                version: root_key.version.clone(),
                deps: Vec::new(),
                has_sdist: None,
                has_bdist: None,
                dep_extras: None,
                done: true,
            },
        );

        for root in roots {
            let requirement = Requirement::parse(root)?;
            self.submit(&requirement.canonical_name());
            self.queue.push_back(QueueItem {
                parent: None,
                requirement,
            });
        }

        while let Some(item) = self.queue.pop_front() {
            let requirement = item.requirement;
            let parent_key = item.parent.clone().unwrap_or_else(NodeKey::synthetic_root);
            info!(
                requirement = %requirement,
                parent = %display_parent(item.parent.as_ref()),
                "dequeue"
            );

            // The python_version marker is by far the most widely used;
            // extras are empty here, the edge-level gate handled them.
            if let Some(marker) = requirement.marker() {
                if !marker.evaluate(&self.env, &[]) {
                    debug!(requirement = %requirement, "marker excluded");
                    continue;
                }
            }

            let name = requirement.canonical_name();
            let package = self.resolve_package(&name).await?;
            let version = find_compatible_version(
                &package,
                requirement.specifiers(),
                &self.python_version,
                self.trim_newer.as_ref(),
                &self.already_chosen,
                current_versions.as_ref(),
            )?;
            debug!(package = name, %version, "chose");

            let key = match package.releases.get(&version) {
                Some(_) => NodeKey {
                    name: package.name.clone(),
                    version: version.clone(),
                    extras: Some(requirement.extras().iter().cloned().collect()),
                },
                None => NodeKey {
                    // Non-public version from the installed oracle.
                    name: name.clone(),
                    version: version.clone(),
                    extras: None,
                },
            };

            if let Some(previous) = self.already_chosen.get(&key.name) {
                if *previous != key.version {
                    warn!(
                        package = key.name,
                        previous = %previous,
                        chosen = %key.version,
                        "multiple versions demanded"
                    );
                    self.known_conflicts.insert(key.name.clone());
                }
            }
            self.already_chosen
                .insert(key.name.clone(), key.version.clone());

            if !self.nodes.contains_key(&key) {
                let (has_sdist, has_bdist) = match package.releases.get(&version) {
                    Some(release) => (
                        Some(
                            release
                                .files
                                .iter()
                                .any(|f| f.file_type == FileType::Sdist),
                        ),
                        Some(
                            release
                                .files
                                .iter()
                                .any(|f| f.file_type == FileType::BdistWheel),
                        ),
                    ),
                    None => (None, None),
                };
                self.nodes.insert(
                    key.clone(),
                    DepNode {
                        name: key.name.clone(),
                        version: version.clone(),
                        deps: Vec::new(),
                        has_sdist,
                        has_bdist,
                        dep_extras: Some(requirement.extras().clone()),
                        done: false,
                    },
                );
            }

            let specifiers = requirement.specifiers().to_string();
            self.nodes
                .get_mut(&parent_key)
                .expect("parent node exists before its children are dequeued")
                .deps
                .push(DepEdge {
                    target: key.clone(),
                    constraints: (!specifiers.is_empty()).then_some(specifiers),
                    markers: requirement.marker().cloned(),
                });

            if self.nodes[&key].done {
                continue;
            }

            let deps = self.fetch_single_deps(&package, &version).await?;
            info!(package = key.name, count = deps.len(), "requirements");
            for dep in deps {
                let dep_requirement = Requirement::parse(&dep)?;

                // A dependency whose marker pins `extra == "x"` only applies
                // when the current requirement asked for that extra.
                let extra_gate = dep_requirement
                    .marker()
                    .and_then(|marker| marker.extra_equals().map(str::to_string));
                let applies = match &extra_gate {
                    None => true,
                    Some(extra) => include_extras || requirement.extras().contains(extra),
                };
                if applies {
                    self.submit(&dep_requirement.canonical_name());
                    debug!(requirement = %dep_requirement, parent = key.name, "enqueue");
                    self.queue.push_back(QueueItem {
                        parent: Some(key.clone()),
                        requirement: dep_requirement,
                    });
                }
            }
            self.nodes
                .get_mut(&key)
                .expect("node created above")
                .done = true;
        }

        Ok(DepWalk {
            nodes: self.nodes,
            root: root_key,
            known_conflicts: self.known_conflicts,
        })
    }

    /// Kick off a background index fetch for `name` unless one is already
    /// in flight (or finished). The semaphore bounds how many run at once.
    fn submit(&mut self, name: &str) {
        if self.fetches.contains_key(name) {
            return;
        }
        let source = self.source.clone();
        let pool = self.pool.clone();
        let pkg = name.to_string();
        let handle = tokio::spawn(async move {
            let _permit = pool.acquire_owned().await.expect("pool never closes");
            source.parse_index(&pkg).await
        });
        self.fetches
            .insert(name.to_string(), PackageFetch::Pending(handle));
    }

    /// Block on the package's fetch, memoising the result so later queue
    /// entries for the same name are free.
    async fn resolve_package(&mut self, name: &str) -> Result<Arc<Package>, ResolveError> {
        self.submit(name);
        if let Some(PackageFetch::Ready(package)) = self.fetches.get(name) {
            return Ok(package.clone());
        }
        let Some(PackageFetch::Pending(handle)) = self.fetches.remove(name) else {
            unreachable!("fetch map entry was just ensured");
        };
        let package = Arc::new(
            handle
                .await
                .map_err(|err| ResolveError::Background(err.to_string()))??,
        );
        self.fetches
            .insert(name.to_string(), PackageFetch::Ready(package.clone()));
        Ok(package)
    }

    /// Discover the requirements of a chosen (package, version).
    ///
    /// Order of preference: an inline requires list on the release; a
    /// wheel's METADATA (read remotely for very large wheels, through the
    /// cache otherwise); the sdist's legacy requires.txt. A version with
    /// no artifacts at all is an error; a non-public version has no
    /// discoverable requirements.
    async fn fetch_single_deps(
        &self,
        package: &Package,
        version: &Version,
    ) -> Result<Vec<String>, ResolveError> {
        let Some(release) = package.releases.get(version) else {
            return Ok(Vec::new());
        };
        if let Some(requires) = &release.requires {
            return Ok(requires.clone());
        }

        for entry in &release.files {
            if entry.file_type != FileType::BdistWheel {
                continue;
            }
            info!(url = entry.url, size = entry.size, "wheel");
            if entry.size.is_some_and(|size| size > REMOTE_READ_THRESHOLD) {
                // Gigantic wheels pay the remote read penalty instead.
                let url = entry.url.clone();
                return tokio::task::spawn_blocking(move || read_metadata_remote_wheel(&url))
                    .await
                    .map_err(|err| ResolveError::Background(err.to_string()))?;
            }
            let local = self
                .cache
                .fetch(&package.name, Some(&entry.url), Some(&entry.basename))
                .await?;
            return tokio::task::spawn_blocking(move || read_metadata_wheel(&local))
                .await
                .map_err(|err| ResolveError::Background(err.to_string()))?;
        }

        for entry in &release.files {
            if entry.file_type != FileType::Sdist {
                continue;
            }
            info!(url = entry.url, "sdist");
            let local = self
                .cache
                .fetch(&package.name, Some(&entry.url), Some(&entry.basename))
                .await?;
            return tokio::task::spawn_blocking(move || read_metadata_sdist(&local))
                .await
                .map_err(|err| ResolveError::Background(err.to_string()))?;
        }

        Err(ResolveError::MissingArtifact {
            package: package.name.clone(),
            version: version.to_string(),
        })
    }
}

fn display_parent(parent: Option<&NodeKey>) -> String {
    match parent {
        Some(key) => key.name.clone(),
        None => "(root)".to_string(),
    }
}

/// Select a version of `package` satisfying `specifiers`.
///
/// Releases newer than `trim_newer` (by their earliest upload time) and
/// releases whose `requires_python` excludes the interpreter are dropped
/// first — a malformed `requires_python` drops its release rather than
/// failing the walk. The installed version joins the candidates even when
/// non-public. Among the survivors the walker prefers, in order: whatever
/// another edge already chose (stability), the installed version, the most
/// recent release.
pub fn find_compatible_version(
    package: &Package,
    specifiers: &SpecifierSet,
    python_version: &Version,
    trim_newer: Option<&DateTime<Utc>>,
    already_chosen: &HashMap<String, Version>,
    current_versions: &(dyn Fn(&str) -> Option<String> + Send + Sync),
) -> Result<Version, ResolveError> {
    let mut possible: Vec<Version> = Vec::new();
    for (version, release) in &package.releases {
        if let Some(cutoff) = trim_newer {
            // Upload times only come from the JSON index; releases without
            // them are never trimmed.
            let earliest = release.files.iter().filter_map(|f| f.upload_time).min();
            if earliest.is_some_and(|uploaded| uploaded > *cutoff) {
                continue;
            }
        }

        // requires_python lives on files, not releases; take the first one.
        let requires_python = release
            .files
            .iter()
            .find_map(|f| f.requires_python.as_deref());
        if let Some(constraint) = requires_python {
            match SpecifierSet::parse(constraint) {
                Ok(set) => {
                    if !set.contains(python_version) {
                        debug!(package = package.name, %version, constraint, "requires-python excluded");
                        continue;
                    }
                }
                Err(_) => {
                    warn!(package = package.name, %version, constraint, "malformed requires_python, dropping release");
                    continue;
                }
            }
        }
        possible.push(version.clone());
    }

    if possible.is_empty() {
        return Err(ResolveError::IncompatibleVersion {
            package: package.name.clone(),
            python_version: python_version.to_string(),
        });
    }

    // The installed version joins the candidate list even when the index
    // has never heard of it.
    let current = current_versions(&package.name).and_then(|v| Version::parse(&v).ok());
    if let Some(version) = &current {
        if !package.releases.contains_key(version) {
            possible.push(version.clone());
        }
    }

    let possible = specifiers.filter(possible);
    if possible.is_empty() {
        return Err(ResolveError::NoMatchingVersion {
            package: package.name.clone(),
            python_version: python_version.to_string(),
            specifiers: specifiers.to_string(),
        });
    }

    // Rank: stick with what another edge chose, then what is installed,
    // then the most recent (ties break toward the later index).
    let chosen = already_chosen.get(&package.name);
    let best = possible
        .iter()
        .enumerate()
        .max_by_key(|&(index, version)| {
            (
                chosen == Some(version),
                current.as_ref() == Some(version),
                index,
            )
        })
        .map(|(_, version)| version.clone())
        .expect("possible is non-empty");
    Ok(best)
}
