//! ZoneMinder entity table
//!
//! Declarative description of the ZoneMinder database. Each entry is data,
//! not code: the filter, mutation, query and backend layers are generic over
//! [`EntityDescriptor`] and pick these shapes up by name.
//!
//! Relations are plain foreign-key scalar columns (`MonitorId`, `EventId`,
//! ...); no entity holds a reference to another.

use super::{EntityDescriptor, EntityRegistry, FieldDef, SchemaError};

// ============================================================================
// Enumerations
// ============================================================================

pub const MONITOR_TYPES: &[&str] = &[
    "Local", "Remote", "File", "Ffmpeg", "Libvlc", "cURL", "WebSite", "NVSocket", "VNC",
];
pub const MONITOR_FUNCTIONS: &[&str] = &["None", "Monitor", "Modect", "Record", "Mocord", "Nodect"];
pub const ORIENTATIONS: &[&str] = &[
    "ROTATE_0", "ROTATE_90", "ROTATE_180", "ROTATE_270", "FLIP_HORI", "FLIP_VERT",
];
pub const MONITOR_STATUSES: &[&str] = &["Unknown", "NotRunning", "Running", "Connected", "Signal"];
pub const STORAGE_SCHEMES: &[&str] = &["Deep", "Medium", "Shallow"];
pub const STORAGE_TYPES: &[&str] = &["local", "s3fs"];
pub const FRAME_TYPES: &[&str] = &["Normal", "Bulk", "Alarm"];
pub const ZONE_TYPES: &[&str] = &[
    "Active", "Inclusive", "Exclusive", "Preclusive", "Inactive", "Privacy",
];
pub const ZONE_UNITS: &[&str] = &["Pixels", "Percent"];
pub const CHECK_METHODS: &[&str] = &["AlarmedPixels", "FilteredPixels", "Blobs"];
pub const CONTROL_TYPES: &[&str] = &[
    "Local", "Remote", "Ffmpeg", "Libvlc", "cURL", "WebSite", "NVSocket",
];
pub const DEVICE_TYPES: &[&str] = &["X10"];
pub const SERVER_STATUSES: &[&str] = &["Unknown", "NotRunning", "Running"];
pub const PERMISSION_VIEW: &[&str] = &["None", "View"];
pub const PERMISSION_EDIT: &[&str] = &["None", "View", "Edit"];

/// Build the registry holding every ZoneMinder entity
pub fn registry() -> Result<EntityRegistry, SchemaError> {
    EntityRegistry::from_descriptors(descriptors()?)
}

/// Every ZoneMinder entity descriptor
pub fn descriptors() -> Result<Vec<EntityDescriptor>, SchemaError> {
    let mut all = vec![
        config()?,
        monitors()?,
        monitor_status()?,
        monitor_presets()?,
        events()?,
        events_archived()?,
        event_summaries()?,
        frames()?,
        stats()?,
        groups()?,
        groups_monitors()?,
        users()?,
        sessions()?,
        zones()?,
        zone_presets()?,
        controls()?,
        control_presets()?,
        devices()?,
        filters()?,
        logs()?,
        servers()?,
        server_stats()?,
        storage()?,
        states()?,
        triggers_x10()?,
        montage_layouts()?,
        snapshots()?,
        snapshots_events()?,
        maps()?,
        manufacturers()?,
        models()?,
        object_types()?,
        tags()?,
        events_tags()?,
    ];
    for name in ["Events_Hour", "Events_Day", "Events_Week", "Events_Month"] {
        all.push(event_rollup(name)?);
    }
    Ok(all)
}

// ============================================================================
// Configuration and system
// ============================================================================

fn config() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Config")
        .field(FieldDef::int("Id").auto_increment().unique())
        .field(FieldDef::string("Name"))
        .field(FieldDef::string("Value"))
        .field(FieldDef::string("Type"))
        .field(FieldDef::string("DefaultValue").nullable())
        .field(FieldDef::string("Hint").nullable())
        .field(FieldDef::string("Pattern").nullable())
        .field(FieldDef::string("Format").nullable())
        .field(FieldDef::string("Prompt").nullable())
        .field(FieldDef::string("Help").nullable())
        .field(FieldDef::string("Category"))
        .field(FieldDef::int("Readonly").default(0))
        .field(FieldDef::string("Requires").nullable())
        .identity(&["Name"])
        .build()
}

fn logs() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Logs")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::decimal("TimeKey"))
        .field(FieldDef::string("Component"))
        .field(FieldDef::int("ServerId").nullable())
        .field(FieldDef::int("Pid").nullable())
        .field(FieldDef::int("Level"))
        .field(FieldDef::string("Code"))
        .field(FieldDef::string("Message"))
        .field(FieldDef::string("File").nullable())
        .field(FieldDef::int("Line").nullable())
        .identity(&["Id"])
        .build()
}

fn servers() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Servers")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Protocol").nullable())
        .field(FieldDef::string("Hostname").nullable())
        .field(FieldDef::int("Port").nullable())
        .field(FieldDef::string("PathToIndex").nullable())
        .field(FieldDef::string("PathToZMS").nullable())
        .field(FieldDef::string("PathToApi").nullable())
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::int("State_Id").nullable())
        .field(FieldDef::enumeration("Status", SERVER_STATUSES).default("Unknown"))
        .field(FieldDef::decimal("CpuLoad").nullable())
        .field(FieldDef::big_int("TotalMem").nullable())
        .field(FieldDef::big_int("FreeMem").nullable())
        .field(FieldDef::big_int("TotalSwap").nullable())
        .field(FieldDef::big_int("FreeSwap").nullable())
        .field(FieldDef::int("zmstats").default(0))
        .field(FieldDef::int("zmaudit").default(0))
        .field(FieldDef::int("zmtrigger").default(0))
        .field(FieldDef::int("zmeventnotification").default(0))
        .identity(&["Id"])
        .build()
}

fn server_stats() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Server_Stats")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::int("ServerId").nullable())
        .field(FieldDef::date_time("TimeStamp").default_now())
        .field(FieldDef::decimal("CpuLoad").nullable())
        .field(FieldDef::big_int("TotalMem").nullable())
        .field(FieldDef::big_int("FreeMem").nullable())
        .field(FieldDef::big_int("TotalSwap").nullable())
        .field(FieldDef::big_int("FreeSwap").nullable())
        .identity(&["Id"])
        .build()
}

fn storage() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Storage")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Path").default(""))
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::enumeration("Type", STORAGE_TYPES).default("local"))
        .field(FieldDef::string("Url").nullable())
        .field(FieldDef::big_int("DiskSpace").nullable())
        .field(FieldDef::enumeration("Scheme", STORAGE_SCHEMES).default("Medium"))
        .field(FieldDef::int("ServerId").nullable())
        .field(FieldDef::int("DoDelete").default(1))
        .field(FieldDef::int("Enabled").default(1))
        .identity(&["Id"])
        .build()
}

fn states() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("States")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").default("").unique())
        .field(FieldDef::string("Definition"))
        .field(FieldDef::int("IsActive").default(0))
        .identity(&["Id"])
        .build()
}

// ============================================================================
// Monitors
// ============================================================================

fn monitors() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Monitors")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::string("Notes").nullable())
        .field(FieldDef::int("ServerId").nullable())
        .field(FieldDef::int("StorageId").default(0))
        .field(FieldDef::enumeration("Type", MONITOR_TYPES).default("Local"))
        .field(FieldDef::enumeration("Function", MONITOR_FUNCTIONS).default("Monitor"))
        .field(FieldDef::int("Enabled").default(1))
        .field(FieldDef::string("LinkedMonitors").nullable())
        .field(FieldDef::string("Device").default(""))
        .field(FieldDef::int("Channel").default(0))
        .field(FieldDef::string("Protocol").nullable())
        .field(FieldDef::string("Method").nullable())
        .field(FieldDef::string("Host").nullable())
        .field(FieldDef::string("Port").default(""))
        .field(FieldDef::string("Path").nullable())
        .field(FieldDef::int("Width").default(0))
        .field(FieldDef::int("Height").default(0))
        .field(FieldDef::int("Colours").default(1))
        .field(FieldDef::enumeration("Orientation", ORIENTATIONS).default("ROTATE_0"))
        .field(FieldDef::decimal("MaxFPS").nullable())
        .field(FieldDef::decimal("AlarmMaxFPS").nullable())
        .field(FieldDef::int("ImageBufferCount").default(3))
        .field(FieldDef::int("Controllable").default(0))
        .field(FieldDef::int("ControlId").nullable())
        .field(FieldDef::int("Sequence").nullable())
        .field(FieldDef::decimal("Latitude").nullable())
        .field(FieldDef::decimal("Longitude").nullable())
        .identity(&["Id"])
        .build()
}

fn monitor_status() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Monitor_Status")
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::enumeration("Status", MONITOR_STATUSES).default("Unknown"))
        .field(FieldDef::decimal("CaptureFPS").default(0))
        .field(FieldDef::decimal("AnalysisFPS").default(0))
        .field(FieldDef::int("CaptureBandwidth").default(0))
        .identity(&["MonitorId"])
        .build()
}

fn monitor_presets() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("MonitorPresets")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::enumeration("Type", MONITOR_TYPES).default("Local"))
        .field(FieldDef::string("Device").nullable())
        .field(FieldDef::string("Protocol").nullable())
        .field(FieldDef::string("Method").nullable())
        .field(FieldDef::string("Host").nullable())
        .field(FieldDef::string("Port").nullable())
        .field(FieldDef::string("Path").nullable())
        .field(FieldDef::int("Width").nullable())
        .field(FieldDef::int("Height").nullable())
        .field(FieldDef::int("Palette").nullable())
        .field(FieldDef::decimal("MaxFPS").nullable())
        .field(FieldDef::int("Controllable").default(0))
        .field(FieldDef::string("ControlId").nullable())
        .identity(&["Id"])
        .build()
}

fn triggers_x10() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("TriggersX10")
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::string("Activation").nullable())
        .field(FieldDef::string("AlarmInput").nullable())
        .field(FieldDef::string("AlarmOutput").nullable())
        .identity(&["MonitorId"])
        .build()
}

fn montage_layouts() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("MontageLayouts")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::string("Positions").nullable())
        .identity(&["Id"])
        .build()
}

// ============================================================================
// Events
// ============================================================================

fn events() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Events")
        .field(FieldDef::big_int("Id").auto_increment())
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::int("StorageId").nullable())
        .field(FieldDef::int("SecondaryStorageId").nullable())
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::string("Cause").default(""))
        .field(FieldDef::date_time("StartDateTime").nullable())
        .field(FieldDef::date_time("EndDateTime").nullable())
        .field(FieldDef::int("Width").default(0))
        .field(FieldDef::int("Height").default(0))
        .field(FieldDef::decimal("Length").default(0))
        .field(FieldDef::int("Frames").nullable())
        .field(FieldDef::int("AlarmFrames").nullable())
        .field(FieldDef::string("DefaultVideo").default(""))
        .field(FieldDef::int("SaveJPEGs").nullable())
        .field(FieldDef::int("TotScore").default(0))
        .field(FieldDef::int("AvgScore").nullable())
        .field(FieldDef::int("MaxScore").nullable())
        .field(FieldDef::int("Archived").default(0))
        .field(FieldDef::int("Videoed").default(0))
        .field(FieldDef::int("Uploaded").default(0))
        .field(FieldDef::int("Emailed").default(0))
        .field(FieldDef::int("Messaged").default(0))
        .field(FieldDef::int("Executed").default(0))
        .field(FieldDef::string("Notes").nullable())
        .field(FieldDef::int("StateId"))
        .field(FieldDef::enumeration("Orientation", ORIENTATIONS).default("ROTATE_0"))
        .field(FieldDef::big_int("DiskSpace").nullable())
        .field(FieldDef::enumeration("Scheme", STORAGE_SCHEMES).default("Medium"))
        .field(FieldDef::boolean("Locked").default(false))
        .identity(&["Id"])
        .build()
}

/// `Events_Hour`, `Events_Day`, `Events_Week` and `Events_Month` share one shape
fn event_rollup(name: &'static str) -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder(name)
        .field(FieldDef::big_int("EventId"))
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::date_time("StartDateTime"))
        .field(FieldDef::big_int("DiskSpace").nullable())
        .identity(&["EventId"])
        .build()
}

fn events_archived() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Events_Archived")
        .field(FieldDef::big_int("EventId"))
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::big_int("DiskSpace").nullable())
        .identity(&["EventId"])
        .build()
}

fn event_summaries() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Event_Summaries")
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::int("TotalEvents").nullable())
        .field(FieldDef::big_int("TotalEventDiskSpace").nullable())
        .field(FieldDef::int("HourEvents").nullable())
        .field(FieldDef::big_int("HourEventDiskSpace").nullable())
        .field(FieldDef::int("DayEvents").nullable())
        .field(FieldDef::big_int("DayEventDiskSpace").nullable())
        .field(FieldDef::int("WeekEvents").nullable())
        .field(FieldDef::big_int("WeekEventDiskSpace").nullable())
        .field(FieldDef::int("MonthEvents").nullable())
        .field(FieldDef::big_int("MonthEventDiskSpace").nullable())
        .field(FieldDef::int("ArchivedEvents").nullable())
        .field(FieldDef::big_int("ArchivedEventDiskSpace").nullable())
        .identity(&["MonitorId"])
        .build()
}

fn frames() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Frames")
        .field(FieldDef::big_int("Id").auto_increment())
        .field(FieldDef::big_int("EventId"))
        .field(FieldDef::int("FrameId"))
        .field(FieldDef::enumeration("Type", FRAME_TYPES).default("Normal"))
        .field(FieldDef::date_time("TimeStamp").default_now())
        .field(FieldDef::decimal("Delta").default(0))
        .field(FieldDef::int("Score").default(0))
        .identity(&["Id"])
        .build()
}

fn stats() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Stats")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::int("ZoneId"))
        .field(FieldDef::big_int("EventId"))
        .field(FieldDef::int("FrameId"))
        .field(FieldDef::int("PixelDiff").default(0))
        .field(FieldDef::int("AlarmPixels").default(0))
        .field(FieldDef::int("FilterPixels").default(0))
        .field(FieldDef::int("BlobPixels").default(0))
        .field(FieldDef::int("Blobs").default(0))
        .field(FieldDef::int("MinBlobSize").default(0))
        .field(FieldDef::int("MaxBlobSize").default(0))
        .field(FieldDef::int("MinX").default(0))
        .field(FieldDef::int("MaxX").default(0))
        .field(FieldDef::int("MinY").default(0))
        .field(FieldDef::int("MaxY").default(0))
        .field(FieldDef::int("Score").default(0))
        .identity(&["Id"])
        .build()
}

fn tags() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Tags")
        .field(FieldDef::big_int("Id").auto_increment())
        .field(FieldDef::string("Name").default("").unique())
        .field(FieldDef::date_time("CreateDate").nullable())
        .field(FieldDef::int("CreatedBy").nullable())
        .field(FieldDef::date_time("LastAssignedDate").nullable())
        .identity(&["Id"])
        .build()
}

fn events_tags() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Events_Tags")
        .field(FieldDef::big_int("TagId"))
        .field(FieldDef::big_int("EventId"))
        .field(FieldDef::date_time("AssignedDate").nullable())
        .field(FieldDef::int("AssignedBy").nullable())
        .identity(&["TagId", "EventId"])
        .build()
}

fn snapshots() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Snapshots")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").nullable())
        .field(FieldDef::string("Description").nullable())
        .field(FieldDef::int("CreatedBy").nullable())
        .field(FieldDef::date_time("CreatedOn").nullable())
        .identity(&["Id"])
        .build()
}

fn snapshots_events() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Snapshots_Events")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::int("SnapshotId"))
        .field(FieldDef::big_int("EventId"))
        .identity(&["Id"])
        .build()
}

// ============================================================================
// Groups and users
// ============================================================================

fn groups() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Groups")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::int("ParentId").nullable())
        .identity(&["Id"])
        .build()
}

fn groups_monitors() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Groups_Monitors")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::int("GroupId"))
        .field(FieldDef::int("MonitorId"))
        .identity(&["Id"])
        .build()
}

fn users() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Users")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Username").unique())
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::string("Email").default(""))
        .field(FieldDef::string("Phone").default(""))
        .field(FieldDef::string("Password"))
        .field(FieldDef::string("Language").nullable())
        .field(FieldDef::int("Enabled").default(1))
        .field(FieldDef::enumeration("Stream", PERMISSION_VIEW).default("None"))
        .field(FieldDef::enumeration("Events", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("Control", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("Monitors", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("Groups", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("Devices", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("Snapshots", PERMISSION_EDIT).default("None"))
        .field(FieldDef::enumeration("System", PERMISSION_EDIT).default("None"))
        .field(FieldDef::string("MaxBandwidth").nullable())
        .field(FieldDef::big_int("TokenMinExpiry").default(0))
        .field(FieldDef::int("APIEnabled").default(1))
        .field(FieldDef::string("HomeView").default(""))
        .identity(&["Id"])
        .build()
}

fn sessions() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Sessions")
        .field(FieldDef::string("id"))
        .field(FieldDef::int("access").nullable())
        .field(FieldDef::string("data").nullable())
        .identity(&["id"])
        .build()
}

// ============================================================================
// Zones
// ============================================================================

fn zones() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Zones")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::string("Name"))
        .field(FieldDef::enumeration("Type", ZONE_TYPES).default("Active"))
        .field(FieldDef::enumeration("Units", ZONE_UNITS).default("Pixels"))
        .field(FieldDef::int("NumCoords").default(0))
        .field(FieldDef::string("Coords"))
        .field(FieldDef::int("Area").default(0))
        .field(FieldDef::int("AlarmRGB").nullable())
        .field(FieldDef::enumeration("CheckMethod", CHECK_METHODS).default("Blobs"))
        .field(FieldDef::int("MinPixelThreshold").nullable())
        .field(FieldDef::int("MaxPixelThreshold").nullable())
        .field(FieldDef::int("MinAlarmPixels").nullable())
        .field(FieldDef::int("MaxAlarmPixels").nullable())
        .field(FieldDef::int("FilterX").nullable())
        .field(FieldDef::int("FilterY").nullable())
        .field(FieldDef::int("MinFilterPixels").nullable())
        .field(FieldDef::int("MaxFilterPixels").nullable())
        .field(FieldDef::int("MinBlobPixels").nullable())
        .field(FieldDef::int("MaxBlobPixels").nullable())
        .field(FieldDef::int("MinBlobs").nullable())
        .field(FieldDef::int("MaxBlobs").nullable())
        .field(FieldDef::int("OverloadFrames").default(0))
        .field(FieldDef::int("ExtendAlarmFrames").default(0))
        .identity(&["Id"])
        .build()
}

fn zone_presets() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("ZonePresets")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").default("").unique())
        .field(FieldDef::enumeration("Type", ZONE_TYPES).default("Active"))
        .field(FieldDef::enumeration("Units", ZONE_UNITS).default("Pixels"))
        .field(FieldDef::enumeration("CheckMethod", CHECK_METHODS).default("Blobs"))
        .field(FieldDef::int("MinPixelThreshold").nullable())
        .field(FieldDef::int("MaxPixelThreshold").nullable())
        .field(FieldDef::int("MinAlarmPixels").nullable())
        .field(FieldDef::int("MaxAlarmPixels").nullable())
        .field(FieldDef::int("FilterX").nullable())
        .field(FieldDef::int("FilterY").nullable())
        .field(FieldDef::int("MinBlobs").nullable())
        .field(FieldDef::int("MaxBlobs").nullable())
        .field(FieldDef::int("OverloadFrames").default(0))
        .field(FieldDef::int("ExtendAlarmFrames").default(0))
        .identity(&["Id"])
        .build()
}

fn maps() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Maps")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::string("Filename").default(""))
        .field(FieldDef::int("NumCoords").default(0))
        .field(FieldDef::string("Coords"))
        .field(FieldDef::int("ParentId").nullable())
        .identity(&["Id"])
        .build()
}

// ============================================================================
// Devices and controls
// ============================================================================

fn devices() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Devices")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::enumeration("Type", DEVICE_TYPES).default("X10"))
        .field(FieldDef::string("KeyString").default(""))
        .identity(&["Id"])
        .build()
}

fn controls() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Controls")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::enumeration("Type", CONTROL_TYPES).default("Local"))
        .field(FieldDef::string("Protocol").nullable())
        .field(FieldDef::int("CanWake").default(0))
        .field(FieldDef::int("CanSleep").default(0))
        .field(FieldDef::int("CanReset").default(0))
        .field(FieldDef::int("CanReboot").default(0))
        .field(FieldDef::int("CanZoom").default(0))
        .field(FieldDef::int("CanFocus").default(0))
        .field(FieldDef::int("CanIris").default(0))
        .field(FieldDef::int("CanWhite").default(0))
        .field(FieldDef::int("CanPan").default(0))
        .field(FieldDef::int("CanTilt").default(0))
        .field(FieldDef::int("HasPresets").default(0))
        .field(FieldDef::int("NumPresets").default(0))
        .field(FieldDef::int("HasHomePreset").default(0))
        .identity(&["Id"])
        .build()
}

fn control_presets() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("ControlPresets")
        .field(FieldDef::int("MonitorId"))
        .field(FieldDef::int("Preset"))
        .field(FieldDef::string("Label"))
        .identity(&["MonitorId", "Preset"])
        .build()
}

fn manufacturers() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Manufacturers")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").unique())
        .identity(&["Id"])
        .build()
}

fn models() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Models")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name"))
        .field(FieldDef::int("ManufacturerId").nullable())
        .identity(&["Id"])
        .build()
}

fn object_types() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Object_Types")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").nullable())
        .field(FieldDef::string("Human").nullable())
        .identity(&["Id"])
        .build()
}

// ============================================================================
// Filters
// ============================================================================

fn filters() -> Result<EntityDescriptor, SchemaError> {
    EntityDescriptor::builder("Filters")
        .field(FieldDef::int("Id").auto_increment())
        .field(FieldDef::string("Name").default(""))
        .field(FieldDef::int("UserId").nullable())
        .field(FieldDef::int("ExecuteInterval").default(60))
        .field(FieldDef::string("Query_json"))
        .field(FieldDef::int("AutoArchive").default(0))
        .field(FieldDef::int("AutoUnarchive").default(0))
        .field(FieldDef::int("AutoVideo").default(0))
        .field(FieldDef::int("AutoUpload").default(0))
        .field(FieldDef::int("AutoEmail").default(0))
        .field(FieldDef::int("AutoMessage").default(0))
        .field(FieldDef::int("AutoExecute").default(0))
        .field(FieldDef::string("AutoExecuteCmd").nullable())
        .field(FieldDef::int("AutoDelete").default(0))
        .field(FieldDef::int("AutoMove").default(0))
        .field(FieldDef::int("AutoMoveTo").default(0))
        .field(FieldDef::int("AutoCopy").default(0))
        .field(FieldDef::int("AutoCopyTo").default(0))
        .field(FieldDef::int("UpdateDiskSpace").default(0))
        .field(FieldDef::int("Background").default(0))
        .field(FieldDef::int("Concurrent").default(0))
        .field(FieldDef::int("LockRows").default(0))
        .identity(&["Id"])
        .build()
}
