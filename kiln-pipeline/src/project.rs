use kiln_base::Platform;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};

pub const PROJECT_FILE_NAME: &str = "kiln_project.json";

const DEFAULT_IO_THREAD_COUNT: usize = 4;
const DEFAULT_MAX_PENDING_IO_OPERATIONS: usize = 4096;

#[derive(Serialize, Deserialize)]
pub struct KilnProjectConfigurationJson {
    pub source_data_path: String,
    pub cache_data_path: String,
    pub platform: Platform,
    #[serde(default)]
    pub io_thread_count: Option<usize>,
    #[serde(default)]
    pub max_pending_io_operations: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct KilnProjectConfiguration {
    // Root of the loose source assets, /Env/Tree is read from <source_data_path>/Env/Tree.json
    pub source_data_path: PathBuf,

    // Root of the platform cache, entries are stored under <cache_data_path>/<platform>/
    pub cache_data_path: PathBuf,

    // The platform this process loads for
    pub platform: Platform,

    pub io_thread_count: usize,
    pub max_pending_io_operations: usize,
}

impl KilnProjectConfiguration {
    pub fn unverified_absolute_path(
        root_path: &Path,
        json_path: &str,
    ) -> PathBuf {
        if Path::new(json_path).is_absolute() {
            PathBuf::from(json_path)
        } else {
            root_path.join(json_path)
        }
    }

    // root_path is the path the json file is in, json_path is the string in json that is meant
    // to be parsed/converted to a canonicalized path
    pub fn parse_dir_path(
        root_path: &Path,
        json_path: &str,
    ) -> Result<PathBuf, Box<dyn Error>> {
        let joined_path = Self::unverified_absolute_path(root_path, json_path);

        if !joined_path.exists() {
            std::fs::create_dir_all(&joined_path)?;
        }

        Ok(dunce::canonicalize(&joined_path).map_err(|e| e.to_string())?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, Box<dyn Error>> {
        let root_path = dunce::canonicalize(
            path.parent()
                .ok_or_else(|| "Parent of project file path could not be found".to_string())?,
        )?;
        let file_contents = std::fs::read_to_string(path)?;
        let project_file: KilnProjectConfigurationJson = serde_json::from_str(&file_contents)?;

        let source_data_path = Self::parse_dir_path(&root_path, &project_file.source_data_path)?;
        let cache_data_path = Self::parse_dir_path(&root_path, &project_file.cache_data_path)?;

        let io_thread_count = project_file
            .io_thread_count
            .unwrap_or(DEFAULT_IO_THREAD_COUNT);
        if io_thread_count == 0 {
            return Err("io_thread_count must be at least 1".into());
        }

        Ok(KilnProjectConfiguration {
            source_data_path,
            cache_data_path,
            platform: project_file.platform,
            io_thread_count,
            max_pending_io_operations: project_file
                .max_pending_io_operations
                .unwrap_or(DEFAULT_MAX_PENDING_IO_OPERATIONS),
        })
    }

    pub fn locate_project_file(search_location: &Path) -> Result<Self, Box<dyn Error>> {
        let mut path = Some(search_location.to_path_buf());
        while let Some(p) = path {
            let joined_path = p.join(PROJECT_FILE_NAME);
            if joined_path.exists() {
                log::info!("Using project configuration at {:?}", joined_path);
                return Self::read_from_path(&joined_path);
            }

            path = p.parent().map(|x| x.to_path_buf());
        }

        Err(format!(
            "{} could not be located at {:?} or in any of its parent directories",
            PROJECT_FILE_NAME, search_location
        ))?
    }
}
