//! DTO 模块
//!
//! 包含所有请求和响应的数据传输对象

pub mod request;
pub mod response;

// 重新导出常用类型
pub use request::{
    AboutRequest, CheckUsernameQuery, CommentRequest, CreateCertificationRequest, CreateEducationRequest,
    CreateExperienceRequest, CreatePingRequest, CreatePostRequest, CreateProjectRequest,
    CreateSkillRequest, LoginRequest, MarkReadRequest, OtpRequestRequest, OtpVerifyRequest,
    PaginationParams,
    PostMediaItem, RegisterRequest, ReportPostRequest, SearchQuery, SubscribeRequest,
    UnsubscribeRequest, UpdateAccountRequest, UpdateCertificationRequest, UpdateEducationRequest,
    UpdateExperienceRequest, UpdatePostRequest, UpdateProjectRequest,
};

pub use response::{
    AboutDto, AccountDto, ApiResponse, CertificationDto, CommentDto, EducationDto, ExperienceDto,
    MediaDto, NotificationDto, PageResponse, PingDto, PingStatusDto, PostDto, ProjectDto,
    PublicAccountDto, SearchResultsDto, SkillDto, UploadDto,
};
