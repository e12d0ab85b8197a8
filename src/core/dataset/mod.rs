//! Dataset builders

mod archive;
mod folder;
mod metadata;
mod yolo;

pub use archive::{
    read_membership, ArchiveDescriptor, ArchiveImageDataset, ArchiveSplitArgs, KeyMode, IMAGES_ROLE,
};
pub use folder::{
    FolderSplit, ImageFolder, ImageFolderOptions, IMAGE_FEATURE, LABEL_FEATURE, OBJECTS_FEATURE,
};
pub use metadata::{infer_columns, read_rows, MetadataRow, FILE_NAME_KEY, METADATA_FILE_NAME};
pub use yolo::{parse_label_file, LabelInfo, YoloDetection};
